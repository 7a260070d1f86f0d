//! connwatch core - connection abstractions shared by the pool, the
//! diagnostics recorder and the query-interception layer
//!
//! This crate defines:
//!
//! - `Connection` / `Transaction` - async traits every driver implements
//! - `Value`, `Row`, `QueryResult`, `StatementResult` - result types
//! - `ConnwatchError` - the error type shared across the workspace

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
