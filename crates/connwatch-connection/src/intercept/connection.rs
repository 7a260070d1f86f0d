//! Connection and transaction wrappers that run the listener chain

use std::sync::Arc;

use async_trait::async_trait;
use connwatch_core::{Connection, QueryResult, Result, StatementResult, Transaction, Value};

use super::listener::{ListenerChain, QueryInfo, QueryMethod, TransactionMethod};

/// A connection whose statements pass through the proxy's listeners
pub struct InterceptingConnection {
    id: u64,
    inner: Arc<dyn Connection>,
    chain: Arc<ListenerChain>,
}

impl InterceptingConnection {
    pub(crate) fn new(id: u64, inner: Arc<dyn Connection>, chain: Arc<ListenerChain>) -> Self {
        Self { id, inner, chain }
    }

    /// Id assigned by the proxy, reported to listeners as `connection_id`
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl Connection for InterceptingConnection {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let info = QueryInfo::new(self.id, sql, params, QueryMethod::Execute);
        self.chain
            .run(info, || self.inner.execute(sql, params))
            .await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let info = QueryInfo::new(self.id, sql, params, QueryMethod::Query);
        self.chain.run(info, || self.inner.query(sql, params)).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let inner = self
            .chain
            .run_transaction(
                self.id,
                TransactionMethod::Begin,
                self.inner.begin_transaction(),
            )
            .await?;
        Ok(Box::new(InterceptingTransaction {
            connection_id: self.id,
            inner,
            chain: Arc::clone(&self.chain),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A transaction begun on an [`InterceptingConnection`]
///
/// Statements run through it are reported with `in_transaction` set.
pub struct InterceptingTransaction {
    connection_id: u64,
    inner: Box<dyn Transaction>,
    chain: Arc<ListenerChain>,
}

#[async_trait]
impl Transaction for InterceptingTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            connection_id,
            inner,
            chain,
        } = *self;
        chain
            .run_transaction(connection_id, TransactionMethod::Commit, inner.commit())
            .await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let Self {
            connection_id,
            inner,
            chain,
        } = *self;
        chain
            .run_transaction(connection_id, TransactionMethod::Rollback, inner.rollback())
            .await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let info = QueryInfo::new(self.connection_id, sql, params, QueryMethod::Query)
            .in_transaction(true);
        self.chain.run(info, || self.inner.query(sql, params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let info = QueryInfo::new(self.connection_id, sql, params, QueryMethod::Execute)
            .in_transaction(true);
        self.chain
            .run(info, || self.inner.execute(sql, params))
            .await
    }
}
