//! The fully wired test data source

use std::sync::Arc;

use async_trait::async_trait;
use connwatch_connection::diagnostics::{DiagnosticSink, DumpState, TracingSink};
use connwatch_connection::intercept::{
    CaptureQueriesListener, DelayListener, MandatoryTransactionListener, ParamLimitListener,
    ProxyDataSource, QueryCountHolder, TaskCaptureQueriesListener,
};
use connwatch_connection::{
    ConnectionFactory, ConnectionPool, DataSource, DiagnosticDataSource, PoolStats,
};
use connwatch_core::{Connection, Result};
use connwatch_driver_sqlite::SqliteConnectionFactory;

use crate::config::HarnessConfig;

/// Recorder layered directly over the pool
pub type Recorder = DiagnosticDataSource<ConnectionPool>;

/// Pool, acquisition recorder and statement listeners wired together
///
/// Connections handed out run every statement through, in order: the
/// parameter limit and transaction guard before the statement, then the
/// slow-query logger, capture, task-scoped capture, counter and delay after
/// it. The capture listener also records transaction begin, commit and
/// rollback. Every acquisition
/// is recorded, and a failed acquisition logs the recent acquisitions plus a
/// thread dump.
pub struct TestDataSource {
    config: HarnessConfig,
    pool: ConnectionPool,
    recorder: Arc<Recorder>,
    proxy: ProxyDataSource<Arc<Recorder>>,
    delay: Arc<DelayListener>,
    counter: Arc<QueryCountHolder>,
    capture: Arc<CaptureQueriesListener>,
    task_capture: Arc<TaskCaptureQueriesListener>,
    transaction_guard: Arc<MandatoryTransactionListener>,
}

impl TestDataSource {
    /// Build over SQLite connections to `config.url`
    pub fn build(config: HarnessConfig) -> Result<Self> {
        let factory = SqliteConnectionFactory::new(config.url.clone())
            .with_credentials(config.username.clone(), config.password.clone());
        Self::builder(config).build(factory)
    }

    /// Build over connections from any factory
    pub fn with_factory<F: ConnectionFactory>(config: HarnessConfig, factory: F) -> Result<Self> {
        Self::builder(config).build(factory)
    }

    pub fn builder(config: HarnessConfig) -> TestDataSourceBuilder {
        TestDataSourceBuilder {
            config,
            sink: None,
            dump_state: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn delay(&self) -> &DelayListener {
        &self.delay
    }

    pub fn counter(&self) -> &QueryCountHolder {
        &self.counter
    }

    pub fn capture(&self) -> &CaptureQueriesListener {
        &self.capture
    }

    /// Captures the statements of a future passed to its `capture`
    pub fn task_capture(&self) -> &TaskCaptureQueriesListener {
        &self.task_capture
    }

    pub fn transaction_guard(&self) -> &MandatoryTransactionListener {
        &self.transaction_guard
    }

    /// Close the pool; later acquisitions fail
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DataSource for TestDataSource {
    async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        self.proxy.get_connection().await
    }

    fn max_size(&self) -> usize {
        self.proxy.max_size()
    }

    fn stats(&self) -> Option<PoolStats> {
        self.proxy.stats()
    }
}

/// Overrides for the diagnostic collaborators of a [`TestDataSource`]
pub struct TestDataSourceBuilder {
    config: HarnessConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    dump_state: Option<Arc<DumpState>>,
}

impl TestDataSourceBuilder {
    /// Where diagnostics go; defaults to [`TracingSink`]
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to the process-wide state, so only the first failing
    /// data source in a test binary dumps threads
    pub fn dump_state(mut self, dump_state: Arc<DumpState>) -> Self {
        self.dump_state = Some(dump_state);
        self
    }

    pub fn build<F: ConnectionFactory>(self, factory: F) -> Result<TestDataSource> {
        let config = self.config;
        config.validate()?;

        let pool = ConnectionPool::new(config.pool_config(), factory);
        let recorder = Arc::new(
            DiagnosticDataSource::new(pool.clone())
                .with_sink(self.sink.unwrap_or_else(|| Arc::new(TracingSink)))
                .with_dump_state(self.dump_state.unwrap_or_else(DumpState::process)),
        );

        let delay = Arc::new(DelayListener::new());
        if let Some(d) = config.delay() {
            delay.enable(d);
        }
        let counter = Arc::new(QueryCountHolder::new());
        let capture = Arc::new(CaptureQueriesListener::new(config.capture_capacity));
        let task_capture = Arc::new(TaskCaptureQueriesListener::new());
        let transaction_guard = Arc::new(MandatoryTransactionListener::new(
            config.mandatory_transaction.exempt_prefixes.iter().cloned(),
        ));
        transaction_guard.set_enabled(config.mandatory_transaction.enabled);

        let proxy = ProxyDataSource::builder(Arc::clone(&recorder))
            .before_query(Arc::new(ParamLimitListener::new(config.max_params)))
            .before_query(Arc::clone(&transaction_guard))
            .log_slow_query(config.slow_query_threshold(), config.slow_query.level)
            .after_query(Arc::clone(&capture))
            .after_query(Arc::clone(&task_capture))
            .count_query(Arc::clone(&counter))
            .after_query(Arc::clone(&delay))
            .build();

        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            max_wait_ms = config.max_wait_ms,
            delay_ms = ?config.delay_ms,
            "test data source ready"
        );
        Ok(TestDataSource {
            config,
            pool,
            recorder,
            proxy,
            delay,
            counter,
            capture,
            task_capture,
            transaction_guard,
        })
    }
}
