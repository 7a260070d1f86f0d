//! Artificial post-statement delay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::listener::{ExecutionInfo, QueryInfo, QueryListener};

/// Sleeps after every statement while a delay is set
///
/// Used to stretch out database work so that pool pressure and timing
/// problems show up in tests. The delay can be changed at any time and
/// applies to statements that complete afterwards.
#[derive(Debug, Default)]
pub struct DelayListener {
    /// Zero means disabled
    delay_ms: AtomicU64,
    delayed: AtomicU64,
}

impl DelayListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let listener = Self::new();
        listener.enable(delay);
        listener
    }

    pub fn enable(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(delay_ms = millis, "enabling query delay");
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.delay_ms.store(0, Ordering::SeqCst);
    }

    /// The delay currently applied, if any
    pub fn delay(&self) -> Option<Duration> {
        match self.delay_ms.load(Ordering::SeqCst) {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }

    /// Number of statements that were delayed
    pub fn delayed_count(&self) -> u64 {
        self.delayed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryListener for DelayListener {
    async fn after_query(&self, info: &QueryInfo, _execution: &ExecutionInfo) {
        if let Some(delay) = self.delay() {
            tracing::trace!(
                connection_id = info.connection_id,
                delay_ms = delay.as_millis() as u64,
                "delaying after query"
            );
            self.delayed.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
        }
    }
}
