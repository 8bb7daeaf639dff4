pub mod batch;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod optimize;
pub mod sink;
pub mod time_value;
pub mod types;
pub mod valuation;

pub use error::FairValueError;
pub use types::*;

/// Standard result type for all fair-value operations
pub type FairValueResult<T> = Result<T, FairValueError>;
