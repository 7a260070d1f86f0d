//! Connwatch Harness - an instrumented data source for integration tests
//!
//! [`TestDataSource`] wires a connection pool, the acquisition recorder and
//! the statement listeners together from a [`HarnessConfig`].

pub mod config;
mod data_source;
mod logging;

#[cfg(test)]
mod tests;

pub use config::{HarnessConfig, MandatoryTransactionConfig, SlowQueryConfig};
pub use data_source::{Recorder, TestDataSource, TestDataSourceBuilder};
pub use logging::init_test_logging;
