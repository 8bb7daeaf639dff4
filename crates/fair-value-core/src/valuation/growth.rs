use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::data::rates::{latest_at_or_before, sort_dedup_last};
use crate::error::FairValueError;
use crate::types::{EntityId, Rate};
use crate::FairValueResult;

/// Perpetual growth rate used when nothing better is known.
pub const DEFAULT_PERPETUAL_GROWTH: Rate = dec!(0.04);

// ---------------------------------------------------------------------------
// Implied growth rates
// ---------------------------------------------------------------------------

/// A perpetual growth rate implied by the market price on a given date.
///
/// Field names on the wire match the persisted calibration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedGrowthRate {
    #[serde(rename = "ticker")]
    pub entity_id: EntityId,
    #[serde(rename = "date")]
    pub as_of_date: NaiveDate,
    #[serde(rename = "implied_perp_g_rate")]
    pub rate: Rate,
}

impl ImpliedGrowthRate {
    pub fn new(entity_id: impl Into<EntityId>, as_of_date: NaiveDate, rate: Rate) -> Self {
        Self {
            entity_id: entity_id.into(),
            as_of_date,
            rate,
        }
    }
}

/// Latest date a calibrated rate may carry to be used for a valuation.
///
/// Only obtainable from an as-of date, one calendar year earlier, so a
/// calibration from the same period as the valuation can never be looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LaggedCutoff(NaiveDate);

impl LaggedCutoff {
    /// Feb 29 maps to Feb 28 of the prior year.
    pub fn from_as_of(as_of: NaiveDate) -> FairValueResult<Self> {
        as_of
            .checked_sub_months(Months::new(12))
            .map(LaggedCutoff)
            .ok_or_else(|| FairValueError::DateError(format!("Cannot lag {as_of} by one year")))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Latest calendar year that ends on or before the cutoff.
    pub fn last_complete_year(&self) -> i32 {
        let year = self.0.year();
        if (self.0.month(), self.0.day()) == (12, 31) {
            year
        } else {
            year - 1
        }
    }
}

/// Calibrated growth rates per entity, sorted by date.
#[derive(Debug, Clone, Default)]
pub struct GrowthRateHistory {
    by_entity: HashMap<EntityId, Vec<(NaiveDate, Rate)>>,
}

impl GrowthRateHistory {
    /// A repeated (entity, date) keeps the last row supplied.
    pub fn new(rows: impl IntoIterator<Item = ImpliedGrowthRate>) -> Self {
        let mut grouped: HashMap<EntityId, Vec<(NaiveDate, Rate)>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.entity_id)
                .or_default()
                .push((row.as_of_date, row.rate));
        }
        let by_entity = grouped
            .into_iter()
            .map(|(entity, points)| (entity, sort_dedup_last(points)))
            .collect();
        Self { by_entity }
    }

    pub fn len(&self) -> usize {
        self.by_entity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    /// Most recent calibration for `entity` dated on or before the cutoff.
    pub fn latest_before(&self, entity: &str, cutoff: LaggedCutoff) -> Option<(NaiveDate, Rate)> {
        self.by_entity
            .get(entity)
            .and_then(|points| latest_at_or_before(points, cutoff.date()))
    }

}

// ---------------------------------------------------------------------------
// Fallback table
// ---------------------------------------------------------------------------

/// One row of the persisted per-year table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyGrowthRate {
    pub year: i32,
    #[serde(rename = "implied_perp_g_rate")]
    pub rate: Rate,
}

/// Cross-sectional growth rate per calendar year, plus the mean across years.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<YearlyGrowthRate>", into = "Vec<YearlyGrowthRate>")]
pub struct GrowthFallbackTable {
    by_year: BTreeMap<i32, Rate>,
    global_mean: Option<Rate>,
}

impl GrowthFallbackTable {
    pub fn new(by_year: BTreeMap<i32, Rate>) -> Self {
        let global_mean = mean(by_year.values().copied());
        Self {
            by_year,
            global_mean,
        }
    }

    /// Per-year quantile of calibrated rates.
    ///
    /// Rows with `rate >= max_rate` are treated as calibration noise and
    /// dropped before the quantile is taken. Quantiles interpolate linearly
    /// between order statistics.
    pub fn from_implied_rates<'a>(
        rows: impl IntoIterator<Item = &'a ImpliedGrowthRate>,
        quantile: Decimal,
        max_rate: Rate,
    ) -> FairValueResult<Self> {
        if quantile < Decimal::ZERO || quantile > Decimal::ONE {
            return Err(FairValueError::InvalidInput {
                field: "quantile".into(),
                reason: format!("Quantile ({quantile}) must lie in [0, 1]"),
            });
        }

        let mut per_year: BTreeMap<i32, Vec<Rate>> = BTreeMap::new();
        for row in rows.into_iter().filter(|r| r.rate < max_rate) {
            per_year
                .entry(row.as_of_date.year())
                .or_default()
                .push(row.rate);
        }

        let by_year = per_year
            .into_iter()
            .filter_map(|(year, mut rates)| {
                rates.sort();
                interpolated_quantile(&rates, quantile).map(|q| (year, q))
            })
            .collect();
        Ok(Self::new(by_year))
    }

    pub fn rate_for_year(&self, year: i32) -> Option<Rate> {
        self.by_year.get(&year).copied()
    }

    /// Mean of the yearly values.
    pub fn global_mean(&self) -> Option<Rate> {
        self.global_mean
    }

    /// Mean of the yearly values up to and including `last_year`.
    pub fn mean_through(&self, last_year: i32) -> Option<Rate> {
        mean(self.by_year.range(..=last_year).map(|(_, r)| *r))
    }

    pub fn years(&self) -> impl Iterator<Item = (i32, Rate)> + '_ {
        self.by_year.iter().map(|(y, r)| (*y, *r))
    }

    pub fn is_empty(&self) -> bool {
        self.by_year.is_empty()
    }
}

impl From<Vec<YearlyGrowthRate>> for GrowthFallbackTable {
    fn from(rows: Vec<YearlyGrowthRate>) -> Self {
        Self::new(rows.into_iter().map(|r| (r.year, r.rate)).collect())
    }
}

impl From<GrowthFallbackTable> for Vec<YearlyGrowthRate> {
    fn from(table: GrowthFallbackTable) -> Self {
        table
            .by_year
            .into_iter()
            .map(|(year, rate)| YearlyGrowthRate { year, rate })
            .collect()
    }
}

fn mean(rates: impl Iterator<Item = Rate>) -> Option<Rate> {
    let (sum, count) = rates.fold((Decimal::ZERO, 0u32), |(sum, n), r| (sum + r, n + 1));
    (count > 0).then(|| sum / Decimal::from(count))
}

/// `sorted` must be ascending.
fn interpolated_quantile(sorted: &[Decimal], q: Decimal) -> Option<Decimal> {
    let (first, rest) = sorted.split_first()?;
    if rest.is_empty() {
        return Some(*first);
    }
    let position = Decimal::from(sorted.len() - 1) * q;
    let lower = position.floor();
    let frac = position - lower;
    let idx = lower.to_usize()?;
    let low = *sorted.get(idx)?;
    match sorted.get(idx + 1) {
        Some(high) => Some(low + (*high - low) * frac),
        None => Some(low),
    }
}

// ---------------------------------------------------------------------------
// Fallback policy
// ---------------------------------------------------------------------------

/// How to pick a perpetual growth rate when no lagged calibration exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthFallbackPolicy {
    /// Last resort when the fallback table is empty
    pub default_rate: Rate,
    /// Quantile used when building the table
    pub quantile: Decimal,
    /// Calibrations at or above this are excluded from the table
    pub max_rate: Rate,
}

impl Default for GrowthFallbackPolicy {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_PERPETUAL_GROWTH,
            quantile: dec!(0.5),
            max_rate: Decimal::ONE,
        }
    }
}

/// Where a perpetual growth rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GrowthRateSource {
    /// The entity's own calibration dated on or before the lagged cutoff
    Calibrated { date: NaiveDate },
    /// Cross-sectional table for a year
    YearTable { year: i32 },
    GlobalMean,
    Default,
}

impl fmt::Display for GrowthRateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowthRateSource::Calibrated { date } => write!(f, "calibrated ({date})"),
            GrowthRateSource::YearTable { year } => write!(f, "year table ({year})"),
            GrowthRateSource::GlobalMean => f.write_str("global mean"),
            GrowthRateSource::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGrowthRate {
    pub rate: Rate,
    #[serde(flatten)]
    pub source: GrowthRateSource,
}

/// Perpetual growth rate for valuing `entity` at `as_of`.
///
/// Precedence: lagged calibration, the table entry for the cutoff's year,
/// the mean of the table years, policy default. Table years that end after
/// the cutoff are never read, so calibrations from within a year of `as_of`
/// cannot leak in through the table either.
pub fn resolve_perpetual_growth(
    entity: &str,
    as_of: NaiveDate,
    history: &GrowthRateHistory,
    table: &GrowthFallbackTable,
    policy: &GrowthFallbackPolicy,
) -> FairValueResult<ResolvedGrowthRate> {
    let cutoff = LaggedCutoff::from_as_of(as_of)?;

    if let Some((date, rate)) = history.latest_before(entity, cutoff) {
        return Ok(ResolvedGrowthRate {
            rate,
            source: GrowthRateSource::Calibrated { date },
        });
    }

    let year = cutoff.date().year();
    let last_year = cutoff.last_complete_year();
    let year_rate = if year <= last_year {
        table.rate_for_year(year)
    } else {
        None
    };
    let resolved = match (year_rate, table.mean_through(last_year)) {
        (Some(rate), _) => ResolvedGrowthRate {
            rate,
            source: GrowthRateSource::YearTable { year },
        },
        (None, Some(rate)) => ResolvedGrowthRate {
            rate,
            source: GrowthRateSource::GlobalMean,
        },
        (None, None) => ResolvedGrowthRate {
            rate: policy.default_rate,
            source: GrowthRateSource::Default,
        },
    };
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
