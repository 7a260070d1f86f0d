//! Guard against statements run outside a transaction

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use connwatch_core::{ConnwatchError, Result};

use super::listener::{QueryInfo, QueryListener};

/// Rejects statements executed outside a transaction while enabled
///
/// Statements starting with one of the exempt prefixes (compared
/// case-insensitively, after leading whitespace) are always allowed.
#[derive(Debug)]
pub struct MandatoryTransactionListener {
    enabled: AtomicBool,
    exempt_prefixes: Vec<String>,
}

impl MandatoryTransactionListener {
    pub fn new(exempt_prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            exempt_prefixes: exempt_prefixes
                .into_iter()
                .map(|p| p.into().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_exempt(&self, sql: &str) -> bool {
        let sql = sql.trim_start().to_ascii_uppercase();
        self.exempt_prefixes
            .iter()
            .any(|prefix| sql.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl QueryListener for MandatoryTransactionListener {
    async fn before_query(&self, info: &QueryInfo) -> Result<()> {
        if !self.is_enabled() || info.in_transaction || self.is_exempt(&info.sql) {
            return Ok(());
        }
        Err(ConnwatchError::Query(format!(
            "Statement executed outside of a transaction: {}",
            info.sql.chars().take(100).collect::<String>()
        )))
    }
}
