//! Listener trait and the per-statement data handed to it

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connwatch_core::{QueryResult, Result, StatementResult, Value};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Statement category, derived from the leading SQL keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl QueryKind {
    pub fn classify(sql: &str) -> Self {
        let keyword = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => QueryKind::Select,
            "INSERT" | "REPLACE" => QueryKind::Insert,
            "UPDATE" => QueryKind::Update,
            "DELETE" => QueryKind::Delete,
            _ => QueryKind::Other,
        }
    }
}

/// Which connection method ran the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMethod {
    Query,
    Execute,
}

/// A statement about to run, or that just ran
#[derive(Debug, Clone)]
pub struct QueryInfo {
    /// Id the proxy assigned to the connection the statement ran on
    pub connection_id: u64,
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: QueryKind,
    pub method: QueryMethod,
    pub in_transaction: bool,
    pub thread: Option<String>,
}

impl QueryInfo {
    pub fn new(connection_id: u64, sql: &str, params: &[Value], method: QueryMethod) -> Self {
        Self {
            connection_id,
            sql: sql.to_string(),
            params: params.to_vec(),
            kind: QueryKind::classify(sql),
            method,
            in_transaction: false,
            thread: std::thread::current().name().map(str::to_string),
        }
    }

    pub fn in_transaction(mut self, in_transaction: bool) -> Self {
        self.in_transaction = in_transaction;
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// Outcome of a statement
#[derive(Debug, Clone)]
pub struct ExecutionInfo {
    pub elapsed: Duration,
    pub success: bool,
    /// Rows returned by a query or affected by a command
    pub rows: u64,
    pub error: Option<String>,
}

/// Transaction lifecycle call made through a proxied connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMethod {
    Begin,
    Commit,
    Rollback,
}

/// A transaction lifecycle call and its outcome
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub connection_id: u64,
    pub method: TransactionMethod,
    pub elapsed: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub thread: Option<String>,
}

/// Hook run around every statement executed through a proxied connection
#[async_trait]
pub trait QueryListener: Send + Sync {
    /// Runs before the statement reaches the database; an error rejects it
    async fn before_query(&self, _info: &QueryInfo) -> Result<()> {
        Ok(())
    }

    /// Runs after the statement completed, whether it succeeded or not
    async fn after_query(&self, _info: &QueryInfo, _execution: &ExecutionInfo) {}

    /// Runs after a transaction was begun, committed or rolled back
    async fn after_transaction(&self, _event: &TransactionEvent) {}
}

pub(crate) trait RowCount {
    fn row_count(&self) -> u64;
}

impl RowCount for QueryResult {
    fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

impl RowCount for StatementResult {
    fn row_count(&self) -> u64 {
        self.affected_rows
    }
}

/// Ordered before/after listeners shared by every connection of a proxy
#[derive(Clone, Default)]
pub(crate) struct ListenerChain {
    pub before: Vec<Arc<dyn QueryListener>>,
    pub after: Vec<Arc<dyn QueryListener>>,
}

impl ListenerChain {
    /// Run `statement` between the before and after listeners
    ///
    /// A rejecting before-listener stops the chain; the statement is not run
    /// and no after-listener sees it.
    pub async fn run<T, F, Fut>(&self, info: QueryInfo, statement: F) -> Result<T>
    where
        T: RowCount,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for listener in &self.before {
            if let Err(e) = listener.before_query(&info).await {
                tracing::debug!(
                    connection_id = info.connection_id,
                    error = %e,
                    "statement rejected by listener"
                );
                return Err(e);
            }
        }

        let started = Instant::now();
        let result = statement().await;
        let execution = ExecutionInfo {
            elapsed: started.elapsed(),
            success: result.is_ok(),
            rows: result.as_ref().map(RowCount::row_count).unwrap_or_default(),
            error: result.as_ref().err().map(ToString::to_string),
        };

        for listener in &self.after {
            listener.after_query(&info, &execution).await;
        }
        result
    }

    /// Run a transaction lifecycle call and report it to the after-listeners
    pub async fn run_transaction<T, Fut>(
        &self,
        connection_id: u64,
        method: TransactionMethod,
        call: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        let event = TransactionEvent {
            connection_id,
            method,
            elapsed: started.elapsed(),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            thread: std::thread::current().name().map(str::to_string),
        };
        for listener in &self.after {
            listener.after_transaction(&event).await;
        }
        result
    }
}
