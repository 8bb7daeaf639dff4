//! Synonym table mapping logical line items to the XBRL concept tags filers
//! actually use.
//!
//! Filers report the same economic quantity under different tags (for example
//! `InterestExpense` versus `InterestIncomeExpenseNonoperatingNet`). Each
//! [`LineItem`] carries an ordered list of candidate concepts; resolution tries
//! them in order and the first present value wins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::observations::ObservationSource;
use crate::FairValueResult;

/// Logical financial-statement fields consumed by the valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItem {
    InterestExpense,
    IncomeTax,
    PretaxIncome,
    LongTermDebt,
    LongTermLease,
    CommonShares,
    PreferredShares,
    OperatingIncome,
    OperatingCashFlow,
    NetIncome,
    StockCompensation,
    Capex,
    Cash,
    CurrentDebt,
}

impl LineItem {
    pub const ALL: [LineItem; 14] = [
        LineItem::InterestExpense,
        LineItem::IncomeTax,
        LineItem::PretaxIncome,
        LineItem::LongTermDebt,
        LineItem::LongTermLease,
        LineItem::CommonShares,
        LineItem::PreferredShares,
        LineItem::OperatingIncome,
        LineItem::OperatingCashFlow,
        LineItem::NetIncome,
        LineItem::StockCompensation,
        LineItem::Capex,
        LineItem::Cash,
        LineItem::CurrentDebt,
    ];

    /// Human-readable label used in failure messages.
    pub fn label(self) -> &'static str {
        match self {
            LineItem::InterestExpense => "interest expense",
            LineItem::IncomeTax => "income tax",
            LineItem::PretaxIncome => "pretax income",
            LineItem::LongTermDebt => "long-term debt",
            LineItem::LongTermLease => "long-term lease obligations",
            LineItem::CommonShares => "common shares outstanding",
            LineItem::PreferredShares => "preferred shares outstanding",
            LineItem::OperatingIncome => "operating income",
            LineItem::OperatingCashFlow => "operating cash flow",
            LineItem::NetIncome => "net income",
            LineItem::StockCompensation => "stock-based compensation",
            LineItem::Capex => "capital expenditure",
            LineItem::Cash => "cash and equivalents",
            LineItem::CurrentDebt => "current debt",
        }
    }

    fn default_concepts(self) -> &'static [&'static str] {
        match self {
            LineItem::InterestExpense => &[
                "InterestExpense",
                "InterestIncomeExpenseNonoperatingNet",
            ],
            LineItem::IncomeTax => &["IncomeTaxExpenseBenefit"],
            LineItem::PretaxIncome => &[
                "IncomeLossFromContinuingOperationsBeforeIncomeTaxesMinorityInterestAndIncomeLossFromEquityMethodInvestments",
                "IncomeLossFromContinuingOperationsBeforeIncomeTaxesExtraordinaryItemsNoncontrollingInterest",
            ],
            LineItem::LongTermDebt => &["LongTermDebtNoncurrent"],
            LineItem::LongTermLease => &["CapitalLeaseObligationsNoncurrent"],
            LineItem::CommonShares => &["CommonStockSharesOutstanding"],
            LineItem::PreferredShares => &["PreferredStockSharesOutstanding"],
            LineItem::OperatingIncome => &["OperatingIncomeLoss"],
            LineItem::OperatingCashFlow => &[
                "NetCashProvidedByUsedInOperatingActivities",
                "NetCashProvidedByUsedInOperatingActivitiesContinuingOperations",
            ],
            LineItem::NetIncome => &["NetIncomeLoss", "ProfitLoss"],
            LineItem::StockCompensation => &["ShareBasedCompensation"],
            LineItem::Capex => &["PaymentsToAcquirePropertyPlantAndEquipment"],
            LineItem::Cash => &["CashAndCashEquivalentsAtCarryingValue"],
            LineItem::CurrentDebt => &["CurrentDebt"],
        }
    }
}

impl fmt::Display for LineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered candidate concepts per line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptTable {
    candidates: BTreeMap<LineItem, Vec<String>>,
}

impl Default for ConceptTable {
    fn default() -> Self {
        let candidates = LineItem::ALL
            .iter()
            .map(|item| {
                let names = item
                    .default_concepts()
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect();
                (*item, names)
            })
            .collect();
        Self { candidates }
    }
}

impl ConceptTable {
    /// Default table with the given line items' candidate lists replaced.
    pub fn with_overrides(overrides: &BTreeMap<LineItem, Vec<String>>) -> Self {
        let mut table = Self::default();
        for (item, names) in overrides {
            table.candidates.insert(*item, names.clone());
        }
        table
    }

    pub fn candidates(&self, item: LineItem) -> &[String] {
        self.candidates
            .get(&item)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Resolve a line item by trying each candidate concept in priority order.
    ///
    /// Ambiguity on any candidate tried is an error, even when a later
    /// candidate would have resolved.
    pub fn resolve<S: ObservationSource + ?Sized>(
        &self,
        source: &S,
        entity: &str,
        item: LineItem,
        fiscal_year: i32,
    ) -> FairValueResult<Option<rust_decimal::Decimal>> {
        for concept in self.candidates(item) {
            if let Some(value) = source.get_observation(entity, concept, fiscal_year)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::observations::{FinancialObservation, ObservationStore};
    use crate::error::FairValueError;
    use rust_decimal_macros::dec;

    fn obs(concept: &str, value: rust_decimal::Decimal) -> FinancialObservation {
        FinancialObservation::new("ACME", concept, 2022, value)
    }

    #[test]
    fn test_every_line_item_has_a_default_candidate() {
        let table = ConceptTable::default();
        for item in LineItem::ALL {
            assert!(!table.candidates(item).is_empty(), "{item:?} has no concepts");
        }
    }

    #[test]
    fn test_primary_concept_wins() {
        let store = ObservationStore::new(vec![
            obs("NetIncomeLoss", dec!(80)),
            obs("ProfitLoss", dec!(95)),
        ]);
        let table = ConceptTable::default();
        let value = table
            .resolve(&store, "ACME", LineItem::NetIncome, 2022)
            .unwrap();
        assert_eq!(value, Some(dec!(80)));
    }

    #[test]
    fn test_alternate_concept_used_when_primary_absent() {
        let store = ObservationStore::new(vec![obs(
            "InterestIncomeExpenseNonoperatingNet",
            dec!(12),
        )]);
        let table = ConceptTable::default();
        let value = table
            .resolve(&store, "ACME", LineItem::InterestExpense, 2022)
            .unwrap();
        assert_eq!(value, Some(dec!(12)));
    }

    #[test]
    fn test_absent_when_no_candidate_present() {
        let store = ObservationStore::new(vec![]);
        let table = ConceptTable::default();
        let value = table
            .resolve(&store, "ACME", LineItem::Capex, 2022)
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_ambiguous_primary_is_an_error() {
        let store = ObservationStore::new(vec![
            obs("NetIncomeLoss", dec!(80)),
            obs("NetIncomeLoss", dec!(81)),
            obs("ProfitLoss", dec!(95)),
        ]);
        let table = ConceptTable::default();
        let err = table
            .resolve(&store, "ACME", LineItem::NetIncome, 2022)
            .unwrap_err();
        assert!(matches!(err, FairValueError::AmbiguousObservation { count: 2, .. }));
    }

    #[test]
    fn test_override_replaces_candidates() {
        let mut overrides = BTreeMap::new();
        overrides.insert(LineItem::Capex, vec!["PaymentsForCapitalImprovements".to_string()]);
        let table = ConceptTable::with_overrides(&overrides);

        assert_eq!(table.candidates(LineItem::Capex), ["PaymentsForCapitalImprovements"]);
        assert_eq!(table.candidates(LineItem::Cash), ["CashAndCashEquivalentsAtCarryingValue"]);
    }
}
