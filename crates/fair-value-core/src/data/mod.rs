//! Read-only data providers consumed by the valuation engine.
//!
//! Everything here is loaded once, before evaluation, and shared immutably
//! across workers.

pub mod concepts;
pub mod market;
pub mod observations;
pub mod rates;

pub use concepts::{ConceptTable, LineItem};
pub use market::{MarketData, MarketSnapshot, PriceHistory, PricePoint};
pub use observations::{FinancialObservation, ObservationSource, ObservationStore};
pub use rates::{RateBook, RatePoint, RateProvider, RateSeries, RateSeriesKind};
