//! Statement interception
//!
//! [`ProxyDataSource`] wraps any [`DataSource`](crate::datasource::DataSource)
//! and routes every statement through an ordered list of [`QueryListener`]s.
//! Before-listeners may reject a statement, in which case it never reaches
//! the database. After-listeners observe the outcome and timing.

mod capture;
mod connection;
mod count;
mod delay;
mod listener;
mod param_limit;
mod proxy;
mod slow_query;
mod task_capture;
mod transaction_guard;


pub use capture::{
    CaptureQueriesListener, CapturedMethod, CapturedQuery, DEFAULT_CAPTURE_CAPACITY,
};
pub use connection::{InterceptingConnection, InterceptingTransaction};
pub use count::{QueryCount, QueryCountHolder};
pub use delay::DelayListener;
pub use listener::{
    ExecutionInfo, QueryInfo, QueryKind, QueryListener, QueryMethod, TransactionEvent,
    TransactionMethod,
};
pub use param_limit::{DEFAULT_MAX_PARAMS, ParamLimitListener};
pub use proxy::{ProxyDataSource, ProxyDataSourceBuilder};
pub use slow_query::{LogLevel, SlowQueryLogger};
pub use task_capture::TaskCaptureQueriesListener;
pub use transaction_guard::MandatoryTransactionListener;
