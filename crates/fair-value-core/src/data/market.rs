use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::rates::{latest_at_or_before, sort_dedup_last};
use crate::types::{EntityId, Money};

/// Per-entity market inputs: closing prices and equity beta.
pub trait MarketData {
    /// Last close on or before `date`; `None` when the history starts later
    /// or the entity is unknown.
    fn share_price_at(&self, entity: &str, date: NaiveDate) -> Option<Money>;

    fn beta(&self, entity: &str) -> Option<Decimal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Money,
}

/// Daily close history for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceHistory {
    closes: Vec<(NaiveDate, Money)>,
}

impl PriceHistory {
    pub fn new(closes: impl IntoIterator<Item = (NaiveDate, Money)>) -> Self {
        Self {
            closes: sort_dedup_last(closes.into_iter().collect()),
        }
    }

    pub fn close_at(&self, date: NaiveDate) -> Option<Money> {
        latest_at_or_before(&self.closes, date).map(|(_, close)| close)
    }
}

impl From<Vec<PricePoint>> for PriceHistory {
    fn from(points: Vec<PricePoint>) -> Self {
        Self::new(points.into_iter().map(|p| (p.date, p.close)))
    }
}

impl From<PriceHistory> for Vec<PricePoint> {
    fn from(history: PriceHistory) -> Self {
        history
            .closes
            .into_iter()
            .map(|(date, close)| PricePoint { date, close })
            .collect()
    }
}

/// In-memory market data snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub share_prices: HashMap<EntityId, PriceHistory>,
    #[serde(default)]
    pub betas: HashMap<EntityId, Decimal>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(mut self, entity: impl Into<EntityId>, history: PriceHistory) -> Self {
        self.share_prices.insert(entity.into(), history);
        self
    }

    pub fn with_beta(mut self, entity: impl Into<EntityId>, beta: Decimal) -> Self {
        self.betas.insert(entity.into(), beta);
        self
    }
}

impl MarketData for MarketSnapshot {
    fn share_price_at(&self, entity: &str, date: NaiveDate) -> Option<Money> {
        self.share_prices.get(entity).and_then(|h| h.close_at(date))
    }

    fn beta(&self, entity: &str) -> Option<Decimal> {
        self.betas.get(entity).copied()
    }
}
