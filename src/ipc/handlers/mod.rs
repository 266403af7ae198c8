pub mod config;
pub mod core;
pub mod dashboard;
pub mod import;
pub mod records;
