//! Pool factory for SQLite connections

use std::sync::Arc;

use async_trait::async_trait;
use connwatch_connection::ConnectionFactory;
use connwatch_core::{Connection, Result};

use crate::SqliteConnection;

/// Opens a new [`SqliteConnection`] for every physical pool slot
#[derive(Clone)]
pub struct SqliteConnectionFactory {
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl SqliteConnectionFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Credentials are accepted for parity with server databases; SQLite
    /// does not use them.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into()).filter(|u| !u.is_empty());
        self.password = Some(password.into()).filter(|p| !p.is_empty());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for SqliteConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnectionFactory")
            .field("url", &self.url)
            .field("has_username", &self.username.is_some())
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tracing::debug!(
            url = %self.url,
            has_username = self.username.is_some(),
            has_password = self.password.is_some(),
            "creating SQLite connection"
        );
        let conn = SqliteConnection::open(&self.url)?;
        Ok(Arc::new(conn))
    }
}
