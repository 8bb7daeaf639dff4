use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::FairValueError;
use crate::types::Rate;
use crate::FairValueResult;

/// Named market-wide rate series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSeriesKind {
    /// 10-year treasury yield
    RiskFree,
    /// Implied equity risk premium
    EquityRiskPremium,
    /// Consensus analyst growth estimate, used as the explicit-horizon FCFF growth
    AnalystGrowth,
    /// Year-over-year market index return
    MarketReturn,
}

impl fmt::Display for RateSeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RateSeriesKind::RiskFree => "risk-free",
            RateSeriesKind::EquityRiskPremium => "equity risk premium",
            RateSeriesKind::AnalystGrowth => "analyst growth estimate",
            RateSeriesKind::MarketReturn => "market return",
        };
        f.write_str(name)
    }
}

/// A dated rate observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub date: NaiveDate,
    pub rate: Rate,
}

/// Date-ordered rate history queried with "latest at or before" semantics.
///
/// Never interpolates and never reads past the query date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RatePoint>", into = "Vec<RatePoint>")]
pub struct RateSeries {
    points: Vec<(NaiveDate, Rate)>,
}

impl RateSeries {
    /// Build a series from unordered points. A repeated date keeps the last
    /// point supplied.
    pub fn new(points: impl IntoIterator<Item = (NaiveDate, Rate)>) -> Self {
        Self {
            points: sort_dedup_last(points.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Last point dated on or before `date`.
    pub fn latest_at(&self, date: NaiveDate) -> Option<(NaiveDate, Rate)> {
        latest_at_or_before(&self.points, date)
    }
}

impl From<Vec<RatePoint>> for RateSeries {
    fn from(points: Vec<RatePoint>) -> Self {
        Self::new(points.into_iter().map(|p| (p.date, p.rate)))
    }
}

impl From<RateSeries> for Vec<RatePoint> {
    fn from(series: RateSeries) -> Self {
        series
            .points
            .into_iter()
            .map(|(date, rate)| RatePoint { date, rate })
            .collect()
    }
}

/// Sort by date; on equal dates the later element of the input survives.
pub(crate) fn sort_dedup_last<T>(mut points: Vec<(NaiveDate, T)>) -> Vec<(NaiveDate, T)> {
    // stable sort keeps input order within a date
    points.sort_by_key(|(date, _)| *date);
    let mut out: Vec<(NaiveDate, T)> = Vec::with_capacity(points.len());
    for point in points {
        match out.last_mut() {
            Some(last) if last.0 == point.0 => *last = point,
            _ => out.push(point),
        }
    }
    out
}

/// Binary search for the last point with `point.date <= date` in a sorted slice.
pub(crate) fn latest_at_or_before<T: Copy>(
    points: &[(NaiveDate, T)],
    date: NaiveDate,
) -> Option<(NaiveDate, T)> {
    let idx = points.partition_point(|(d, _)| *d <= date);
    idx.checked_sub(1).map(|i| points[i])
}

/// Market-wide rates as of a date.
pub trait RateProvider {
    fn rate_at(&self, series: RateSeriesKind, date: NaiveDate) -> FairValueResult<Rate>;
}

/// In-memory collection of named rate series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateBook {
    series: HashMap<RateSeriesKind, RateSeries>,
}

impl RateBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, kind: RateSeriesKind, series: RateSeries) -> Self {
        self.series.insert(kind, series);
        self
    }
}

impl RateProvider for RateBook {
    fn rate_at(&self, series: RateSeriesKind, date: NaiveDate) -> FairValueResult<Rate> {
        self.series
            .get(&series)
            .and_then(|s| s.latest_at(date))
            .map(|(_, rate)| rate)
            .ok_or(FairValueError::MissingRate { series, date })
    }
}
