use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::data::concepts::LineItem;
use crate::data::rates::RateSeriesKind;
use std::fmt;

/// An input the valuation cannot proceed without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredInput {
    Beta,
    SharePrice,
    Shares,
    OperatingIncome,
    Item(LineItem),
}

impl fmt::Display for RequiredInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredInput::Beta => f.write_str("beta"),
            RequiredInput::SharePrice => f.write_str("share price"),
            RequiredInput::Shares => f.write_str("shares outstanding"),
            RequiredInput::OperatingIncome => f.write_str("operating income"),
            RequiredInput::Item(item) => write!(f, "{item}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FairValueError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Financial impossibility: {0}")]
    FinancialImpossibility(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Missing required input: {0}")]
    MissingInput(RequiredInput),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Multiple observations for {entity} and {concept} in year {fiscal_year} ({count} rows)")]
    AmbiguousObservation {
        entity: String,
        concept: String,
        fiscal_year: i32,
        count: usize,
    },

    #[error("No {series} rate recorded at or before {date}")]
    MissingRate { series: RateSeriesKind, date: NaiveDate },

    #[error("Terminal growth rate ({growth}) must be below WACC ({wacc})")]
    DivergentTerminalValue { growth: Decimal, wacc: Decimal },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FairValueError {
    fn from(e: serde_json::Error) -> Self {
        FairValueError::SerializationError(e.to_string())
    }
}
