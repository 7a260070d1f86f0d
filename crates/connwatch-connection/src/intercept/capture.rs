//! In-memory record of executed statements

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connwatch_core::Value;
use parking_lot::Mutex;
use serde::Serialize;

use super::listener::{
    ExecutionInfo, QueryInfo, QueryKind, QueryListener, TransactionEvent, TransactionMethod,
};

/// Default number of statements kept by [`CaptureQueriesListener`]
pub const DEFAULT_CAPTURE_CAPACITY: usize = 1000;

/// A statement recorded by [`CaptureQueriesListener`]
#[derive(Debug, Clone, Serialize)]
pub struct CapturedQuery {
    pub connection_id: u64,
    pub sql: String,
    pub params: Vec<Value>,
    pub param_count: usize,
    pub kind: QueryKind,
    pub in_transaction: bool,
    pub thread: Option<String>,
    pub elapsed: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl CapturedQuery {
    pub(crate) fn from_execution(info: &QueryInfo, execution: &ExecutionInfo) -> Self {
        Self {
            connection_id: info.connection_id,
            sql: info.sql.clone(),
            params: info.params.clone(),
            param_count: info.param_count(),
            kind: info.kind,
            in_transaction: info.in_transaction,
            thread: info.thread.clone(),
            elapsed: execution.elapsed,
            success: execution.success,
            error: execution.error.clone(),
            executed_at: Utc::now(),
        }
    }
}

/// A transaction begin, commit or rollback recorded by [`CaptureQueriesListener`]
#[derive(Debug, Clone, Serialize)]
pub struct CapturedMethod {
    pub connection_id: u64,
    pub method: TransactionMethod,
    pub elapsed: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub thread: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Keeps the most recent statements so tests can assert on them
///
/// Transaction lifecycle calls are kept alongside, in their own list. Each
/// list drops its oldest entries once `capacity` are held.
#[derive(Debug)]
pub struct CaptureQueriesListener {
    capacity: usize,
    queries: Mutex<VecDeque<CapturedQuery>>,
    methods: Mutex<VecDeque<CapturedMethod>>,
}

impl CaptureQueriesListener {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            methods: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Captured statements, oldest first
    pub fn captured(&self) -> Vec<CapturedQuery> {
        self.queries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.lock().is_empty()
    }

    /// Captured transaction calls, oldest first
    pub fn captured_methods(&self) -> Vec<CapturedMethod> {
        self.methods.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.queries.lock().clear();
        self.methods.lock().clear();
    }

    pub fn queries_of_kind(&self, kind: QueryKind) -> Vec<CapturedQuery> {
        self.queries
            .lock()
            .iter()
            .filter(|q| q.kind == kind)
            .cloned()
            .collect()
    }

    pub fn select_queries(&self) -> Vec<CapturedQuery> {
        self.queries_of_kind(QueryKind::Select)
    }

    pub fn insert_queries(&self) -> Vec<CapturedQuery> {
        self.queries_of_kind(QueryKind::Insert)
    }

    pub fn update_queries(&self) -> Vec<CapturedQuery> {
        self.queries_of_kind(QueryKind::Update)
    }

    pub fn delete_queries(&self) -> Vec<CapturedQuery> {
        self.queries_of_kind(QueryKind::Delete)
    }

    /// Statements executed from the named thread
    pub fn for_thread(&self, thread: &str) -> Vec<CapturedQuery> {
        self.queries
            .lock()
            .iter()
            .filter(|q| q.thread.as_deref() == Some(thread))
            .cloned()
            .collect()
    }

    /// Log every captured statement at debug level
    pub fn log_all(&self) {
        let queries = self.queries.lock();
        tracing::debug!(count = queries.len(), "captured queries");
        for (i, query) in queries.iter().enumerate() {
            tracing::debug!(
                index = i,
                connection_id = query.connection_id,
                kind = ?query.kind,
                elapsed_ms = query.elapsed.as_millis() as u64,
                success = query.success,
                sql = %query.sql,
                "captured query"
            );
        }
    }
}

impl Default for CaptureQueriesListener {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_CAPACITY)
    }
}

#[async_trait]
impl QueryListener for CaptureQueriesListener {
    async fn after_query(&self, info: &QueryInfo, execution: &ExecutionInfo) {
        if self.capacity == 0 {
            return;
        }
        let captured = CapturedQuery::from_execution(info, execution);
        let mut queries = self.queries.lock();
        while queries.len() >= self.capacity {
            queries.pop_front();
        }
        queries.push_back(captured);
    }

    async fn after_transaction(&self, event: &TransactionEvent) {
        if self.capacity == 0 {
            return;
        }
        let captured = CapturedMethod {
            connection_id: event.connection_id,
            method: event.method,
            elapsed: event.elapsed,
            success: event.success,
            error: event.error.clone(),
            thread: event.thread.clone(),
            executed_at: Utc::now(),
        };
        let mut methods = self.methods.lock();
        while methods.len() >= self.capacity {
            methods.pop_front();
        }
        methods.push_back(captured);
    }
}
