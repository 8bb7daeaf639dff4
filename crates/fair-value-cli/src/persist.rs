//! CSV persistence for batch results.
//!
//! Decimals are written and parsed as text so no value ever passes through a
//! float on the way to or from disk.

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fair_value_core::engine::ValuationRecord;
use fair_value_core::sink::{merge_by_key, Keyed, ResultSink};
use fair_value_core::valuation::growth::{GrowthFallbackTable, ImpliedGrowthRate, YearlyGrowthRate};
use fair_value_core::{FairValueError, FairValueResult, ValuationKey};

type Fields<'r> = HashMap<&'r str, &'r str>;

/// A row type with a fixed CSV layout.
pub trait CsvRow: Keyed + Sized {
    const HEADERS: &'static [&'static str];

    fn to_fields(&self) -> Vec<String>;

    fn from_fields(fields: &Fields<'_>) -> Result<Self, String>;
}

fn field<'r>(fields: &Fields<'r>, name: &str) -> Result<&'r str, String> {
    fields
        .get(name)
        .copied()
        .ok_or_else(|| format!("missing column '{name}'"))
}

fn parse_date(fields: &Fields<'_>, name: &str) -> Result<NaiveDate, String> {
    let raw = field(fields, name)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("bad {name} '{raw}': {e}"))
}

fn parse_decimal(fields: &Fields<'_>, name: &str) -> Result<Decimal, String> {
    let raw = field(fields, name)?;
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("bad {name} '{raw}': {e}"))
}

fn parse_optional_decimal(fields: &Fields<'_>, name: &str) -> Result<Option<Decimal>, String> {
    match fields.get(name).copied() {
        None | Some("") => Ok(None),
        Some(_) => parse_decimal(fields, name).map(Some),
    }
}

fn optional(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl CsvRow for ValuationRecord {
    const HEADERS: &'static [&'static str] = &[
        "ticker",
        "date",
        "intrinsic_value",
        "share_price",
        "error_message",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.ticker.clone(),
            self.date.to_string(),
            optional(self.intrinsic_value),
            optional(self.share_price),
            self.error_message.clone().unwrap_or_default(),
        ]
    }

    fn from_fields(fields: &Fields<'_>) -> Result<Self, String> {
        Ok(ValuationRecord {
            ticker: field(fields, "ticker")?.to_string(),
            date: parse_date(fields, "date")?,
            intrinsic_value: parse_optional_decimal(fields, "intrinsic_value")?,
            share_price: parse_optional_decimal(fields, "share_price")?,
            error_message: fields
                .get("error_message")
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
        })
    }
}

impl CsvRow for ImpliedGrowthRate {
    const HEADERS: &'static [&'static str] = &["ticker", "date", "implied_perp_g_rate"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.entity_id.clone(),
            self.as_of_date.to_string(),
            self.rate.to_string(),
        ]
    }

    fn from_fields(fields: &Fields<'_>) -> Result<Self, String> {
        Ok(ImpliedGrowthRate::new(
            field(fields, "ticker")?,
            parse_date(fields, "date")?,
            parse_decimal(fields, "implied_perp_g_rate")?,
        ))
    }
}

/// A row plus the time it was last written.
struct Stamped<R> {
    row: R,
    created: String,
}

impl<R: Keyed> Keyed for Stamped<R> {
    fn key(&self) -> ValuationKey {
        self.row.key()
    }
}

fn read_stamped<R: CsvRow>(path: &Path) -> Result<Vec<Stamped<R>>, String> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| e.to_string())?;
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        let fields: Fields<'_> = headers.iter().zip(record.iter()).collect();
        let row = R::from_fields(&fields)
            .map_err(|e| format!("{} row {}: {}", path.display(), line + 1, e))?;
        let created = fields.get("created").copied().unwrap_or_default().to_string();
        rows.push(Stamped { row, created });
    }
    Ok(rows)
}

/// Read every row of a results file.
pub fn read_rows<R: CsvRow>(path: &Path) -> Result<Vec<R>, Box<dyn std::error::Error>> {
    Ok(read_stamped(path)?.into_iter().map(|s| s.row).collect())
}

/// Results file updated in place: rows with a new (ticker, date) are
/// appended, rows with an existing key are replaced.
pub struct CsvUpsertSink<R> {
    path: PathBuf,
    _rows: PhantomData<R>,
}

impl<R: CsvRow> CsvUpsertSink<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _rows: PhantomData,
        }
    }

    fn write(&self, rows: &[Stamped<R>]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let mut writer = csv::Writer::from_path(&self.path).map_err(|e| e.to_string())?;

        let mut headers: Vec<&str> = R::HEADERS.to_vec();
        headers.push("created");
        writer.write_record(&headers).map_err(|e| e.to_string())?;

        for stamped in rows {
            let mut fields = stamped.row.to_fields();
            fields.push(stamped.created.clone());
            writer.write_record(&fields).map_err(|e| e.to_string())?;
        }
        writer.flush().map_err(|e| e.to_string())
    }
}

impl<R: CsvRow> ResultSink<R> for CsvUpsertSink<R> {
    fn upsert(&mut self, rows: Vec<R>) -> FairValueResult<usize> {
        let existing = if self.path.exists() {
            read_stamped(&self.path).map_err(FairValueError::SerializationError)?
        } else {
            Vec::new()
        };

        let created = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let incoming = rows.into_iter().map(|row| Stamped {
            row,
            created: created.clone(),
        });

        let merged = merge_by_key(existing, incoming);
        self.write(&merged)
            .map_err(|e| FairValueError::SerializationError(format!("{}: {}", self.path.display(), e)))?;
        Ok(merged.len())
    }
}

/// Overwrite a per-year fallback table file.
pub fn write_fallback_table(path: &Path, table: &GrowthFallbackTable) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["year", "implied_perp_g_rate"])?;
    for (year, rate) in table.years() {
        writer.write_record([year.to_string(), rate.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_fallback_table(path: &Path) -> Result<GrowthFallbackTable, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: Fields<'_> = headers.iter().zip(record.iter()).collect();
        let year = field(&fields, "year")?
            .parse::<i32>()
            .map_err(|e| format!("bad year: {e}"))?;
        rows.push(YearlyGrowthRate {
            year,
            rate: parse_decimal(&fields, "implied_perp_g_rate")?,
        });
    }
    Ok(GrowthFallbackTable::from(rows))
}
