//! Data source that hands out intercepted connections

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use connwatch_core::{Connection, Result};

use super::connection::InterceptingConnection;
use super::count::QueryCountHolder;
use super::listener::{ListenerChain, QueryListener};
use super::slow_query::{LogLevel, SlowQueryLogger};
use crate::datasource::DataSource;
use crate::pool::PoolStats;

/// Wraps a [`DataSource`] so every statement runs through a listener chain
pub struct ProxyDataSource<D> {
    inner: D,
    chain: Arc<ListenerChain>,
    next_connection_id: AtomicU64,
}

impl<D: DataSource> ProxyDataSource<D> {
    pub fn builder(inner: D) -> ProxyDataSourceBuilder<D> {
        ProxyDataSourceBuilder {
            inner,
            chain: ListenerChain::default(),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Number of (before, after) listeners registered
    pub fn listener_counts(&self) -> (usize, usize) {
        (self.chain.before.len(), self.chain.after.len())
    }
}

#[async_trait]
impl<D: DataSource> DataSource for ProxyDataSource<D> {
    async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        let connection = self.inner.get_connection().await?;
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InterceptingConnection::new(
            id,
            connection,
            Arc::clone(&self.chain),
        )))
    }

    fn max_size(&self) -> usize {
        self.inner.max_size()
    }

    fn stats(&self) -> Option<PoolStats> {
        self.inner.stats()
    }
}

/// Registers listeners, in order, for a [`ProxyDataSource`]
///
/// # Example
///
/// ```ignore
/// let proxy = ProxyDataSource::builder(source)
///     .log_slow_query(Duration::from_secs(10), LogLevel::Info)
///     .before_query(Arc::new(ParamLimitListener::new(1000)))
///     .after_query(delay.clone())
///     .count_query(counter.clone())
///     .build();
/// ```
pub struct ProxyDataSourceBuilder<D> {
    inner: D,
    chain: ListenerChain,
}

impl<D: DataSource> ProxyDataSourceBuilder<D> {
    /// Run `listener` before each statement
    pub fn before_query<L: QueryListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.chain.before.push(listener);
        self
    }

    /// Run `listener` after each statement
    pub fn after_query<L: QueryListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.chain.after.push(listener);
        self
    }

    /// Count every statement into `holder`
    pub fn count_query(self, holder: Arc<QueryCountHolder>) -> Self {
        self.after_query(holder)
    }

    /// Log statements that take at least `threshold`
    pub fn log_slow_query(self, threshold: Duration, level: LogLevel) -> Self {
        self.after_query(Arc::new(SlowQueryLogger::new(threshold, level)))
    }

    pub fn build(self) -> ProxyDataSource<D> {
        tracing::debug!(
            before = self.chain.before.len(),
            after = self.chain.after.len(),
            "built proxy data source"
        );
        ProxyDataSource {
            inner: self.inner,
            chain: Arc::new(self.chain),
            next_connection_id: AtomicU64::new(0),
        }
    }
}
