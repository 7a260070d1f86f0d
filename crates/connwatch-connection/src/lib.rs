//! Connwatch Connection - pooling, acquisition diagnostics and statement interception
//!
//! Every piece here implements or wraps [`DataSource`], so a test setup is
//! built by layering: a [`ConnectionPool`] at the bottom, a
//! [`DiagnosticDataSource`] recording who acquired connections, and a
//! [`ProxyDataSource`] running listeners around each statement.

pub mod datasource;
pub mod diagnostics;
pub mod intercept;
pub mod pool;

#[cfg(test)]
mod test_support;

pub use datasource::{ConnectionFactory, DataSource};
pub use diagnostics::{
    CapturedTrace, DiagnosticDataSource, DiagnosticSink, DumpState, MemorySink, TracingSink,
};
pub use intercept::{
    CaptureQueriesListener, DelayListener, MandatoryTransactionListener, ParamLimitListener,
    ProxyDataSource, QueryCountHolder, QueryListener,
};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
