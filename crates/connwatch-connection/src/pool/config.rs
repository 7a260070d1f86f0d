//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wait bound when acquiring a connection (30 seconds)
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// Configuration for a connection pool
///
/// `max_size` is the pool's max-total: the number of connections that may be
/// checked out at once. Acquisition waits at most `acquire_timeout` for a
/// free slot before failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    min_size: usize,
    max_size: usize,
    acquire_timeout_ms: u64,
    idle_timeout_ms: u64,
    max_lifetime_ms: Option<u64>,
    /// Run the factory's validation before handing out an idle connection
    #[serde(default = "default_validate_on_borrow")]
    validate_on_borrow: bool,
}

fn default_validate_on_borrow() -> bool {
    true
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            min_size,
            max_size,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
            validate_on_borrow: true,
        }
    }

    /// Set the acquisition wait bound in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum connection lifetime in milliseconds
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    /// Enable or disable validation of idle connections on checkout
    pub fn with_validate_on_borrow(mut self, validate: bool) -> Self {
        self.validate_on_borrow = validate;
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn validate_on_borrow(&self) -> bool {
        self.validate_on_borrow
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - min_size: 0
    /// - max_size: 10
    /// - acquire_timeout: 30 seconds
    /// - idle_timeout: 10 minutes
    /// - max_lifetime: None
    fn default() -> Self {
        Self::new(0, 10)
    }
}
