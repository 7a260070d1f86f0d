//! Statement capture scoped to one task

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::capture::CapturedQuery;
use super::listener::{ExecutionInfo, QueryInfo, QueryListener};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(0);

struct CaptureScope {
    listener_id: u64,
    queries: Mutex<Vec<CapturedQuery>>,
}

tokio::task_local! {
    static CAPTURE_SCOPE: Arc<CaptureScope>;
}

/// Captures statements only for code that opted in with [`capture`]
///
/// Runtime worker threads are shared by every task, so thread identity
/// cannot tell callers apart. Capture here follows the future passed to
/// [`capture`] instead: statements it executes through a proxy carrying this
/// listener are collected, those of other tasks are not. Tasks spawned from
/// inside the future are not part of the scope. When scopes nest, the
/// innermost one receives the statements.
///
/// [`capture`]: TaskCaptureQueriesListener::capture
#[derive(Debug)]
pub struct TaskCaptureQueriesListener {
    id: u64,
}

impl TaskCaptureQueriesListener {
    pub fn new() -> Self {
        Self {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Run `future`, returning its output and the statements it executed
    pub async fn capture<F: Future>(&self, future: F) -> (F::Output, Vec<CapturedQuery>) {
        let scope = Arc::new(CaptureScope {
            listener_id: self.id,
            queries: Mutex::new(Vec::new()),
        });
        let output = CAPTURE_SCOPE.scope(Arc::clone(&scope), future).await;
        let queries = std::mem::take(&mut *scope.queries.lock());
        (output, queries)
    }
}

impl Default for TaskCaptureQueriesListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryListener for TaskCaptureQueriesListener {
    async fn after_query(&self, info: &QueryInfo, execution: &ExecutionInfo) {
        let _ = CAPTURE_SCOPE.try_with(|scope| {
            if scope.listener_id == self.id {
                scope
                    .queries
                    .lock()
                    .push(CapturedQuery::from_execution(info, execution));
            }
        });
    }
}
