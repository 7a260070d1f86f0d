//! The resource-provider seam shared by the pool and its decorators

use std::sync::Arc;

use async_trait::async_trait;
use connwatch_core::{Connection, Result};

use crate::pool::PoolStats;

/// Factory trait for creating new physical connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation only checks that the connection is open.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Something that hands out a bounded number of connections
///
/// Implemented by [`ConnectionPool`](crate::pool::ConnectionPool) and by every
/// decorator layered over it, so decorators compose by holding another
/// `DataSource` rather than by extending it.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Acquire a connection, waiting up to the source's configured bound
    ///
    /// The connection goes back to its pool once the last handle is dropped.
    async fn get_connection(&self) -> Result<Arc<dyn Connection>>;

    /// Maximum number of connections that can be held concurrently
    fn max_size(&self) -> usize;

    /// Live pool counters, if the source tracks them
    fn stats(&self) -> Option<PoolStats> {
        None
    }
}

#[async_trait]
impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        (**self).get_connection().await
    }

    fn max_size(&self) -> usize {
        (**self).max_size()
    }

    fn stats(&self) -> Option<PoolStats> {
        (**self).stats()
    }
}
