//! Connection pooling for database connections
//!
//! A bounded pool with a configurable wait bound. Exceeding the bound is
//! reported as [`ConnwatchError::AcquisitionTimeout`](connwatch_core::ConnwatchError),
//! which is what the diagnostics layer listens for.
//!
//! # Example
//!
//! ```ignore
//! use connwatch_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(0, 20).with_acquire_timeout_ms(5000);
//!
//! let pool = ConnectionPool::new(config, connection_factory);
//! let conn = pool.get().await?;
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;


pub use config::{DEFAULT_ACQUIRE_TIMEOUT_MS, PoolConfig};
pub use pool::{ConnectionPool, PooledConnection, PooledTransaction};
pub use stats::PoolStats;
