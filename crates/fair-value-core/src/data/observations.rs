use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;

use crate::error::FairValueError;
use crate::types::EntityId;
use crate::FairValueResult;

/// One reported line item for one company-year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialObservation {
    pub entity_id: EntityId,
    pub concept: String,
    pub fiscal_year: i32,
    pub value: Decimal,
    /// Statement date the value was reported for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
}

impl FinancialObservation {
    pub fn new(
        entity_id: impl Into<EntityId>,
        concept: impl Into<String>,
        fiscal_year: i32,
        value: Decimal,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            concept: concept.into(),
            fiscal_year,
            value,
            period_end: None,
        }
    }

    pub fn with_period_end(mut self, period_end: NaiveDate) -> Self {
        self.period_end = Some(period_end);
        self
    }
}

/// Point-in-time line-item lookup.
pub trait ObservationSource {
    /// `Ok(None)` when nothing was reported; `Err(AmbiguousObservation)` when
    /// more than one row matches.
    fn get_observation(
        &self,
        entity: &str,
        concept: &str,
        fiscal_year: i32,
    ) -> FairValueResult<Option<Decimal>>;
}

type ObservationKey = (EntityId, String, i32);

/// In-memory, read-only observation table indexed by (entity, concept, year).
#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    index: HashMap<ObservationKey, Vec<Decimal>>,
    reporting_dates: HashMap<EntityId, BTreeSet<NaiveDate>>,
}

impl ObservationStore {
    pub fn new(observations: impl IntoIterator<Item = FinancialObservation>) -> Self {
        let mut store = Self::default();
        for obs in observations {
            if let Some(date) = obs.period_end {
                store
                    .reporting_dates
                    .entry(obs.entity_id.clone())
                    .or_default()
                    .insert(date);
            }
            store
                .index
                .entry((obs.entity_id, obs.concept, obs.fiscal_year))
                .or_default()
                .push(obs.value);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Entities with at least one dated observation, sorted.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self.reporting_dates.keys().cloned().collect();
        out.sort();
        out
    }

    /// Distinct statement dates for an entity, ascending, optionally limited
    /// to a range of calendar years.
    pub fn reporting_dates(
        &self,
        entity: &str,
        years: Option<&RangeInclusive<i32>>,
    ) -> Vec<NaiveDate> {
        self.reporting_dates
            .get(entity)
            .map(|dates| {
                dates
                    .iter()
                    .filter(|d| years.map_or(true, |r| r.contains(&d.year())))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ObservationSource for ObservationStore {
    fn get_observation(
        &self,
        entity: &str,
        concept: &str,
        fiscal_year: i32,
    ) -> FairValueResult<Option<Decimal>> {
        let key = (entity.to_string(), concept.to_string(), fiscal_year);
        match self.index.get(&key).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([value]) => Ok(Some(*value)),
            Some(values) => Err(FairValueError::AmbiguousObservation {
                entity: entity.to_string(),
                concept: concept.to_string(),
                fiscal_year,
                count: values.len(),
            }),
        }
    }
}
