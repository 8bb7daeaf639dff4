use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::data::concepts::{ConceptTable, LineItem};
use crate::error::FairValueError;
use crate::valuation::calibration::CalibrationConfig;
use crate::valuation::growth::GrowthFallbackPolicy;
use crate::FairValueResult;

/// Run-wide settings for valuation and calibration batches.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Replacement candidate lists for individual line items
    pub concept_overrides: BTreeMap<LineItem, Vec<String>>,
    pub calibration: CalibrationConfig,
    pub growth_fallback: GrowthFallbackPolicy,
    /// First calendar year of reporting dates to evaluate
    pub first_year: i32,
    /// Last calendar year of reporting dates to evaluate
    pub last_year: i32,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            concept_overrides: BTreeMap::new(),
            calibration: CalibrationConfig::default(),
            growth_fallback: GrowthFallbackPolicy::default(),
            first_year: 2009,
            last_year: 2023,
        }
    }
}

impl ValuationConfig {
    pub fn from_json(json: &str) -> FairValueResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn concept_table(&self) -> ConceptTable {
        ConceptTable::with_overrides(&self.concept_overrides)
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    pub fn validate(&self) -> FairValueResult<()> {
        if self.first_year > self.last_year {
            return Err(invalid(
                "first_year",
                format!(
                    "First year ({}) is after last year ({})",
                    self.first_year, self.last_year
                ),
            ));
        }

        let cal = &self.calibration;
        if cal.singularity_margin <= Decimal::ZERO {
            return Err(invalid(
                "calibration.singularity_margin",
                "Margin below WACC must be positive".into(),
            ));
        }
        if cal.tolerance <= Decimal::ZERO {
            return Err(invalid(
                "calibration.tolerance",
                "Tolerance must be positive".into(),
            ));
        }
        if cal.max_iterations == 0 {
            return Err(invalid(
                "calibration.max_iterations",
                "Iteration budget must be at least 1".into(),
            ));
        }
        if cal.max_relative_residual < Decimal::ZERO {
            return Err(invalid(
                "calibration.max_relative_residual",
                "Residual tolerance cannot be negative".into(),
            ));
        }

        let q = self.growth_fallback.quantile;
        if q < Decimal::ZERO || q > Decimal::ONE {
            return Err(invalid(
                "growth_fallback.quantile",
                format!("Quantile ({q}) must lie in [0, 1]"),
            ));
        }

        for (item, names) in &self.concept_overrides {
            if names.is_empty() {
                return Err(invalid(
                    "concept_overrides",
                    format!("Override for {item} lists no concepts"),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> FairValueError {
    FairValueError::InvalidInput {
        field: field.into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = ValuationConfig::default();
        assert_eq!(config.years(), 2009..=2023);
        assert_eq!(config.calibration.max_iterations, 500);
        assert_eq!(config.growth_fallback.default_rate, dec!(0.04));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "last_year": 2020,
            "growth_fallback": { "default_rate": "0.03" },
            "concept_overrides": { "net_income": ["ProfitLoss"] }
        }"#;
        let config = ValuationConfig::from_json(json).unwrap();
        assert_eq!(config.years(), 2009..=2020);
        assert_eq!(config.growth_fallback.default_rate, dec!(0.03));
        assert_eq!(config.growth_fallback.quantile, dec!(0.5));
        assert_eq!(
            config.concept_table().candidates(LineItem::NetIncome),
            ["ProfitLoss".to_string()]
        );
        assert_eq!(
            config.concept_table().candidates(LineItem::InterestExpense).len(),
            2
        );
    }

    #[test]
    fn test_rejects_inverted_years() {
        let json = r#"{ "first_year": 2021, "last_year": 2020 }"#;
        assert!(matches!(
            ValuationConfig::from_json(json),
            Err(FairValueError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_override() {
        let mut config = ValuationConfig::default();
        config.concept_overrides.insert(LineItem::Capex, Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_margin() {
        let mut config = ValuationConfig::default();
        config.calibration.singularity_margin = Decimal::ZERO;
        assert!(config.validate().is_err());
    }
}
