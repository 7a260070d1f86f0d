//! Mock connections shared by the unit tests of this crate

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use connwatch_core::{
    Connection, ConnwatchError, QueryResult, Result, StatementResult, Transaction, Value,
};
use parking_lot::Mutex;

use crate::datasource::ConnectionFactory;

/// In-memory connection that records every statement it receives
pub(crate) struct MockConnection {
    #[allow(dead_code)]
    pub id: usize,
    closed: AtomicBool,
    pub statements: Mutex<Vec<String>>,
    /// When set, every statement fails with this message
    pub fail_with: Mutex<Option<String>>,
}

impl MockConnection {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            statements: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        }
    }

    fn record(&self, sql: &str) -> Result<()> {
        self.statements.lock().push(sql.to_string());
        match self.fail_with.lock().as_ref() {
            Some(message) => Err(ConnwatchError::Query(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.record(sql)?;
        Ok(StatementResult::command(params.len() as u64))
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.record(sql)?;
        Ok(QueryResult::default())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MockTransaction))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockTransaction;

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::default())
    }

    async fn execute(&self, _sql: &str, params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::command(params.len() as u64))
    }
}

/// Factory that counts connections created and can be told to fail
pub(crate) struct MockConnectionFactory {
    counter: AtomicUsize,
    fail: AtomicBool,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConnwatchError::Connection("database unavailable".into()));
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection::new(id)))
    }
}
