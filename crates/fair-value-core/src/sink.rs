use std::collections::BTreeMap;

use crate::engine::ValuationRecord;
use crate::types::ValuationKey;
use crate::valuation::growth::ImpliedGrowthRate;
use crate::FairValueResult;

/// A persisted row identified by (ticker, date).
pub trait Keyed {
    fn key(&self) -> ValuationKey;
}

impl Keyed for ValuationRecord {
    fn key(&self) -> ValuationKey {
        ValuationKey::new(self.ticker.clone(), self.date)
    }
}

impl Keyed for ImpliedGrowthRate {
    fn key(&self) -> ValuationKey {
        ValuationKey::new(self.entity_id.clone(), self.as_of_date)
    }
}

/// Destination for batch results. Writing a row whose key already exists
/// replaces it.
pub trait ResultSink<R: Keyed> {
    /// Returns the number of rows stored after the write.
    fn upsert(&mut self, rows: Vec<R>) -> FairValueResult<usize>;
}

/// Merge `incoming` over `existing` by key, last write wins, sorted by key.
pub fn merge_by_key<R: Keyed>(
    existing: impl IntoIterator<Item = R>,
    incoming: impl IntoIterator<Item = R>,
) -> Vec<R> {
    let mut merged: BTreeMap<ValuationKey, R> = BTreeMap::new();
    for row in existing.into_iter().chain(incoming) {
        merged.insert(row.key(), row);
    }
    merged.into_values().collect()
}

/// In-memory sink, mostly for tests and embedding.
#[derive(Debug, Clone)]
pub struct MemorySink<R> {
    rows: BTreeMap<ValuationKey, R>,
}

impl<R> Default for MemorySink<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R> MemorySink<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ValuationKey) -> Option<&R> {
        self.rows.get(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<R: Keyed> ResultSink<R> for MemorySink<R> {
    fn upsert(&mut self, rows: Vec<R>) -> FairValueResult<usize> {
        for row in rows {
            self.rows.insert(row.key(), row);
        }
        Ok(self.rows.len())
    }
}
