//! Statement counters

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use super::listener::{ExecutionInfo, QueryInfo, QueryKind, QueryListener};

/// Counts of statements seen by a [`QueryCountHolder`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryCount {
    pub select: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub other: u64,
    pub success: u64,
    pub failure: u64,
    pub elapsed: Duration,
}

impl QueryCount {
    pub fn total(&self) -> u64 {
        self.select + self.insert + self.update + self.delete + self.other
    }

    pub fn of_kind(&self, kind: QueryKind) -> u64 {
        match kind {
            QueryKind::Select => self.select,
            QueryKind::Insert => self.insert,
            QueryKind::Update => self.update,
            QueryKind::Delete => self.delete,
            QueryKind::Other => self.other,
        }
    }
}

/// Accumulates a [`QueryCount`] over every statement that ran
#[derive(Debug, Default)]
pub struct QueryCountHolder {
    count: Mutex<QueryCount>,
}

impl QueryCountHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> QueryCount {
        *self.count.lock()
    }

    pub fn reset(&self) {
        *self.count.lock() = QueryCount::default();
    }
}

#[async_trait]
impl QueryListener for QueryCountHolder {
    async fn after_query(&self, info: &QueryInfo, execution: &ExecutionInfo) {
        let mut count = self.count.lock();
        match info.kind {
            QueryKind::Select => count.select += 1,
            QueryKind::Insert => count.insert += 1,
            QueryKind::Update => count.update += 1,
            QueryKind::Delete => count.delete += 1,
            QueryKind::Other => count.other += 1,
        }
        if execution.success {
            count.success += 1;
        } else {
            count.failure += 1;
        }
        count.elapsed += execution.elapsed;
    }
}
