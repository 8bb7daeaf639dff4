use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;

use fair_value_core::batch::{valuation_keys, BatchRunner, BatchSummary};
use fair_value_core::config::ValuationConfig;
use fair_value_core::engine::{ValuationContext, ValuationRecord};
use fair_value_core::sink::ResultSink;
use fair_value_core::valuation::growth::{
    GrowthFallbackTable, GrowthRateHistory, ImpliedGrowthRate, YearlyGrowthRate,
};
use fair_value_core::ValuationKey;

use crate::input::dataset::{load_config, Dataset};
use crate::input::file::{absolute, resolve_path};
use crate::persist::{self, CsvUpsertSink};

/// Arguments for a valuation batch
#[derive(Args)]
pub struct ValueArgs {
    /// Dataset file (JSON/YAML) with observations, rate series and market data
    #[arg(long)]
    pub dataset: String,

    /// Calibrated growth rates from earlier runs (CSV)
    #[arg(long)]
    pub implied_rates: Option<String>,

    /// Per-year fallback growth table (CSV); derived from --implied-rates when omitted
    #[arg(long)]
    pub fallback: Option<String>,

    /// Results file (CSV) to upsert into
    #[arg(long)]
    pub results: Option<String>,

    /// Only value these tickers
    #[arg(long, value_delimiter = ',')]
    pub ticker: Vec<String>,

    /// Run config (JSON/YAML)
    #[arg(long)]
    pub config: Option<String>,
}

/// Arguments for a calibration batch
#[derive(Args)]
pub struct CalibrateArgs {
    /// Dataset file (JSON/YAML) with observations, rate series and market data
    #[arg(long)]
    pub dataset: String,

    /// Implied growth rate file (CSV) to upsert into
    #[arg(long)]
    pub out: Option<String>,

    /// Only calibrate these tickers
    #[arg(long, value_delimiter = ',')]
    pub ticker: Vec<String>,

    /// Run config (JSON/YAML)
    #[arg(long)]
    pub config: Option<String>,
}

/// Arguments for building the per-year fallback table
#[derive(Args)]
pub struct FallbackTableArgs {
    /// Calibrated growth rates (CSV)
    #[arg(long)]
    pub implied_rates: String,

    /// Output file (CSV), overwritten
    #[arg(long)]
    pub out: Option<String>,

    /// Quantile of each year's rates to keep (0.5 = median)
    #[arg(long)]
    pub quantile: Option<Decimal>,

    /// Rates at or above this are dropped before aggregating
    #[arg(long)]
    pub max_rate: Option<Decimal>,

    /// Run config (JSON/YAML)
    #[arg(long)]
    pub config: Option<String>,
}

fn select_keys(dataset: &Dataset, config: &ValuationConfig, tickers: &[String]) -> Vec<ValuationKey> {
    let mut keys = valuation_keys(&dataset.store, &config.years());
    if !tickers.is_empty() {
        keys.retain(|key| tickers.iter().any(|t| t == &key.entity));
    }
    keys
}

fn fallback_table(
    rows: &[ImpliedGrowthRate],
    config: &ValuationConfig,
) -> Result<GrowthFallbackTable, Box<dyn std::error::Error>> {
    let policy = &config.growth_fallback;
    Ok(GrowthFallbackTable::from_implied_rates(
        rows,
        policy.quantile,
        policy.max_rate,
    )?)
}

pub fn run_value(args: ValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    let dataset = Dataset::load(&args.dataset)?;

    let implied: Vec<ImpliedGrowthRate> = match args.implied_rates {
        Some(ref path) => persist::read_rows(&resolve_path(path)?)?,
        None => Vec::new(),
    };
    let table = match args.fallback {
        Some(ref path) => persist::read_fallback_table(&resolve_path(path)?)?,
        None => fallback_table(&implied, &config)?,
    };
    info!(
        implied_rates = implied.len(),
        fallback_years = table.years().count(),
        "Loaded growth rate history"
    );

    let keys = select_keys(&dataset, &config, &args.ticker);
    let ctx = ValuationContext::new(&dataset.store, &dataset.rates, &dataset.market, config)
        .with_growth_history(GrowthRateHistory::new(implied))
        .with_fallback_table(table);

    let valuations = BatchRunner::new(&ctx).value_all(&keys);
    let summary = BatchSummary::from_valuations(valuations.values());
    let records: Vec<ValuationRecord> = valuations.values().map(|v| v.to_record()).collect();

    if let Some(ref path) = args.results {
        let path = absolute(path)?;
        let stored = CsvUpsertSink::new(&path).upsert(records.clone())?;
        info!(path = %path.display(), rows = stored, "Results written");
    }

    Ok(json!({
        "summary": summary,
        "results": records,
    }))
}

pub fn run_calibrate(args: CalibrateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    let dataset = Dataset::load(&args.dataset)?;

    let keys = select_keys(&dataset, &config, &args.ticker);
    let ctx = ValuationContext::new(&dataset.store, &dataset.rates, &dataset.market, config);
    let rows: Vec<ImpliedGrowthRate> = BatchRunner::new(&ctx)
        .calibrate_all(&keys)
        .into_values()
        .collect();

    if let Some(ref path) = args.out {
        let path = absolute(path)?;
        let stored = CsvUpsertSink::new(&path).upsert(rows.clone())?;
        info!(path = %path.display(), rows = stored, "Implied growth rates written");
    }

    Ok(json!({
        "summary": {
            "total": keys.len(),
            "calibrated": rows.len(),
            "skipped": keys.len() - rows.len(),
        },
        "results": rows,
    }))
}

pub fn run_fallback_table(args: FallbackTableArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(quantile) = args.quantile {
        config.growth_fallback.quantile = quantile;
    }
    if let Some(max_rate) = args.max_rate {
        config.growth_fallback.max_rate = max_rate;
    }

    let rows: Vec<ImpliedGrowthRate> = persist::read_rows(&resolve_path(&args.implied_rates)?)?;
    let table = fallback_table(&rows, &config)?;

    if let Some(ref path) = args.out {
        let path = absolute(path)?;
        persist::write_fallback_table(&path, &table)?;
        info!(path = %path.display(), years = table.years().count(), "Fallback table written");
    }

    let years: Vec<YearlyGrowthRate> = table
        .years()
        .map(|(year, rate)| YearlyGrowthRate { year, rate })
        .collect();
    Ok(json!({
        "summary": {
            "implied_rates": rows.len(),
            "global_mean": table.global_mean(),
        },
        "results": years,
    }))
}
