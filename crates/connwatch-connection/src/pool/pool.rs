//! Connection pool implementation

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use connwatch_core::{
    Connection, ConnwatchError, QueryResult, Result, StatementResult, Transaction, Value,
};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::PoolConfig;
use super::stats::PoolStats;
use crate::datasource::{ConnectionFactory, DataSource};

/// A physical connection plus the bookkeeping the pool needs to recycle it
struct PhysicalConnection {
    id: u64,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

/// State shared between the pool and every handle it has given out
struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<PhysicalConnection>>,
    /// One permit per connection that may be checked out
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    next_id: AtomicU64,
}

impl PoolShared {
    fn return_connection(&self, mut physical: PhysicalConnection) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if physical.connection.is_closed() || self.semaphore.is_closed() {
            tracing::debug!(connection_id = physical.id, "dropping closed connection");
            return;
        }

        physical.last_used_at = Instant::now();
        tracing::trace!(connection_id = physical.id, "connection returned to pool");
        self.idle.lock().push_back(physical);
    }
}

/// A bounded pool of database connections
///
/// At most `max_size` connections are checked out at any time. Callers beyond
/// that wait up to the configured acquire timeout and then fail with
/// [`ConnwatchError::AcquisitionTimeout`]. Connections go back to the pool
/// when their [`PooledConnection`] handle is dropped.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            shared: Arc::new(PoolShared {
                config,
                factory: Arc::new(factory),
                idle: Mutex::new(VecDeque::new()),
                semaphore,
                active_count: AtomicUsize::new(0),
                waiting_count: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Get a connection from the pool
    ///
    /// Waits for a free slot for at most the configured acquire timeout, then
    /// reuses an idle connection or creates a new one.
    pub async fn get(&self) -> Result<PooledConnection> {
        let shared = &self.shared;
        let started = Instant::now();

        shared.waiting_count.fetch_add(1, Ordering::SeqCst);
        let permit = tokio::time::timeout(
            shared.config.acquire_timeout(),
            shared.semaphore.clone().acquire_owned(),
        )
        .await;
        shared.waiting_count.fetch_sub(1, Ordering::SeqCst);

        let permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ConnwatchError::Connection("Pool is closed".into())),
            Err(_) => {
                let waited = started.elapsed();
                tracing::debug!(
                    max_size = shared.config.max_size(),
                    waited_ms = waited.as_millis() as u64,
                    "timed out waiting for a pooled connection"
                );
                return Err(ConnwatchError::AcquisitionTimeout {
                    max_size: shared.config.max_size(),
                    waited,
                });
            }
        };

        let physical = match self.try_get_idle().await {
            Some(physical) => physical,
            None => self.create_physical().await?,
        };

        shared.active_count.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(connection_id = physical.id, "connection checked out");

        Ok(PooledConnection {
            checkout: Arc::new(Checkout {
                physical: Some(physical),
                shared: Arc::clone(shared),
                _permit: permit,
            }),
        })
    }

    async fn create_physical(&self) -> Result<PhysicalConnection> {
        let connection = self.shared.factory.create().await?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        tracing::debug!(connection_id = id, "opened new pooled connection");
        Ok(PhysicalConnection {
            id,
            connection,
            created_at: now,
            last_used_at: now,
        })
    }

    /// Pop idle connections until one passes lifetime, idle and validation checks
    async fn try_get_idle(&self) -> Option<PhysicalConnection> {
        let config = &self.shared.config;
        loop {
            let physical = { self.shared.idle.lock().pop_front() }?;

            let expired = config
                .max_lifetime()
                .is_some_and(|max| physical.created_at.elapsed() > max);
            let stale = physical.last_used_at.elapsed() > config.idle_timeout();
            let invalid = config.validate_on_borrow()
                && !self.shared.factory.validate(&*physical.connection).await;

            if expired || stale || invalid {
                tracing::debug!(
                    connection_id = physical.id,
                    expired,
                    stale,
                    invalid,
                    "discarding idle connection"
                );
                let _ = physical.connection.close().await;
                continue;
            }

            return Some(physical);
        }
    }

    /// Open connections until `min_size` are idle in the pool
    pub async fn warm_up(&self) -> Result<()> {
        let wanted = self.shared.config.min_size();
        while self.shared.idle.lock().len() < wanted {
            let physical = self.create_physical().await?;
            self.shared.idle.lock().push_back(physical);
        }
        Ok(())
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.idle.lock().len();
        let active = self.shared.active_count.load(Ordering::SeqCst);
        let waiting = self.shared.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(
            idle + active,
            idle,
            active,
            waiting,
            self.shared.config.max_size(),
        )
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Close all idle connections in the pool
    pub async fn close_idle(&self) {
        let connections: Vec<_> = { self.shared.idle.lock().drain(..).collect() };

        for physical in connections {
            let _ = physical.connection.close().await;
        }
    }

    /// Close the pool: pending and future acquisitions fail, idle connections
    /// are closed, checked-out connections are closed when returned
    pub async fn close(&self) {
        self.shared.semaphore.close();
        self.close_idle().await;
    }
}

#[async_trait]
impl DataSource for ConnectionPool {
    async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        let conn = self.get().await?;
        Ok(Arc::new(conn))
    }

    fn max_size(&self) -> usize {
        self.shared.config.max_size()
    }

    fn stats(&self) -> Option<PoolStats> {
        Some(ConnectionPool::stats(self))
    }
}

/// A physical connection and its pool slot, held by a connection handle and
/// by every transaction begun through it
///
/// The connection goes back to the pool, and the slot is freed, only when the
/// last holder drops.
struct Checkout {
    physical: Option<PhysicalConnection>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl Checkout {
    fn connection(&self) -> Result<&Arc<dyn Connection>> {
        self.physical
            .as_ref()
            .map(|p| &p.connection)
            .ok_or_else(|| ConnwatchError::Connection("Connection already returned".into()))
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(physical) = self.physical.take() {
            self.shared.return_connection(physical);
        }
    }
}

/// A connection checked out of the pool
///
/// Dropping the handle returns the connection and frees its slot, unless a
/// transaction begun on it is still open; then the transaction returns it.
/// Calling [`Connection::close`] closes the physical connection instead, so
/// it is discarded rather than reused.
pub struct PooledConnection {
    checkout: Arc<Checkout>,
}

impl PooledConnection {
    /// Pool-assigned id of the physical connection
    pub fn id(&self) -> u64 {
        self.checkout
            .physical
            .as_ref()
            .map(|p| p.id)
            .unwrap_or_default()
    }

    /// Get the underlying connection
    pub fn inner(&self) -> Result<&Arc<dyn Connection>> {
        self.checkout.connection()
    }
}

#[async_trait]
impl Connection for PooledConnection {
    fn driver_name(&self) -> &str {
        self.checkout
            .physical
            .as_ref()
            .map(|p| p.connection.driver_name())
            .unwrap_or("pooled")
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.inner()?.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.inner()?.query(sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let inner = self.inner()?.begin_transaction().await?;
        Ok(Box::new(PooledTransaction {
            inner,
            _checkout: Arc::clone(&self.checkout),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.inner()?.close().await
    }

    fn is_closed(&self) -> bool {
        self.checkout
            .physical
            .as_ref()
            .is_none_or(|p| p.connection.is_closed())
    }
}

/// A transaction that keeps its connection checked out until it ends
pub struct PooledTransaction {
    // dropped first, so the driver rolls back before the connection is returned
    inner: Box<dyn Transaction>,
    _checkout: Arc<Checkout>,
}

#[async_trait]
impl Transaction for PooledTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.inner.rollback().await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.inner.execute(sql, params).await
    }
}
