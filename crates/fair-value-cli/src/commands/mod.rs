pub mod batch;
pub mod valuation;
