pub mod calibration;
pub mod dcf;
pub mod fcff;
pub mod growth;
pub mod wacc;
