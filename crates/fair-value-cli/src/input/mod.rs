pub mod dataset;
pub mod file;
pub mod stdin;
