use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::info;

use crate::data::observations::ObservationStore;
use crate::engine::{calibrate_entity, value_entity, Valuation, ValuationContext};
use crate::types::ValuationKey;
use crate::valuation::growth::ImpliedGrowthRate;

/// Every (entity, reporting date) in the store within the year range, sorted.
pub fn valuation_keys(store: &ObservationStore, years: &RangeInclusive<i32>) -> Vec<ValuationKey> {
    store
        .entities()
        .into_iter()
        .flat_map(|entity| {
            store
                .reporting_dates(&entity, Some(years))
                .into_iter()
                .map(move |date| ValuationKey::new(entity.clone(), date))
        })
        .collect()
}

/// Counts over a finished valuation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub valued: usize,
    pub failed: usize,
    /// Failures caused by conflicting source rows
    pub data_integrity_failures: usize,
}

impl BatchSummary {
    pub fn from_valuations<'v>(valuations: impl IntoIterator<Item = &'v Valuation>) -> Self {
        valuations
            .into_iter()
            .fold(Self::default(), |mut summary, valuation| {
                summary.total += 1;
                match valuation.outcome.failure() {
                    None => summary.valued += 1,
                    Some(failure) => {
                        summary.failed += 1;
                        if failure.is_data_integrity() {
                            summary.data_integrity_failures += 1;
                        }
                    }
                }
                summary
            })
    }
}

/// Runs the engine over many keys against one shared context.
pub struct BatchRunner<'c, 'a> {
    ctx: &'c ValuationContext<'a>,
}

impl<'c, 'a> BatchRunner<'c, 'a> {
    pub fn new(ctx: &'c ValuationContext<'a>) -> Self {
        Self { ctx }
    }

    /// Value every key; each key appears exactly once in the result.
    pub fn value_all(&self, keys: &[ValuationKey]) -> BTreeMap<ValuationKey, Valuation> {
        let results = self.map_keys(keys, |key| Some(value_entity(self.ctx, key)));
        let summary = BatchSummary::from_valuations(results.values());
        info!(
            total = summary.total,
            valued = summary.valued,
            failed = summary.failed,
            data_integrity_failures = summary.data_integrity_failures,
            "Valuation batch finished"
        );
        results
    }

    /// Calibrate every key; keys where calibration is impossible are absent.
    pub fn calibrate_all(&self, keys: &[ValuationKey]) -> BTreeMap<ValuationKey, ImpliedGrowthRate> {
        let results = self.map_keys(keys, |key| calibrate_entity(self.ctx, key));
        info!(
            total = keys.len(),
            calibrated = results.len(),
            "Calibration batch finished"
        );
        results
    }

    #[cfg(feature = "batch")]
    fn map_keys<T, F>(&self, keys: &[ValuationKey], f: F) -> BTreeMap<ValuationKey, T>
    where
        T: Send,
        F: Fn(&ValuationKey) -> Option<T> + Sync,
    {
        use rayon::prelude::*;

        keys.par_iter()
            .filter_map(|key| f(key).map(|value| (key.clone(), value)))
            .collect()
    }

    #[cfg(not(feature = "batch"))]
    fn map_keys<T, F>(&self, keys: &[ValuationKey], f: F) -> BTreeMap<ValuationKey, T>
    where
        F: Fn(&ValuationKey) -> Option<T>,
    {
        keys.iter()
            .filter_map(|key| f(key).map(|value| (key.clone(), value)))
            .collect()
    }
}
