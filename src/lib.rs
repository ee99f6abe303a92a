pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod gw2;
pub mod output;
pub mod progress;
pub mod report;
pub mod store;
pub mod sync;
pub mod xlsx;
