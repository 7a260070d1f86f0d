//! Harness configuration
//!
//! Read from TOML, with a handful of `CONNWATCH_*` environment variables
//! taking precedence:
//!
//! ```toml
//! url = "file:orders?mode=memory&cache=shared"
//! max_connections = 4
//! max_wait_ms = 2000
//!
//! [slow_query]
//! threshold_ms = 250
//! level = "warn"
//!
//! [mandatory_transaction]
//! enabled = true
//! ```

use std::path::Path;
use std::time::Duration;

use connwatch_connection::PoolConfig;
use connwatch_connection::intercept::{DEFAULT_CAPTURE_CAPACITY, DEFAULT_MAX_PARAMS, LogLevel};
use connwatch_core::{ConnwatchError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_URL: &str = "file:connwatch_test?mode=memory&cache=shared";

pub const ENV_URL: &str = "CONNWATCH_URL";
pub const ENV_MAX_CONNECTIONS: &str = "CONNWATCH_MAX_CONNECTIONS";
pub const ENV_MAX_WAIT_MS: &str = "CONNWATCH_MAX_WAIT_MS";
pub const ENV_DELAY_MS: &str = "CONNWATCH_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Pool size, and the number of acquisition traces kept
    pub max_connections: usize,
    pub min_connections: usize,
    pub max_wait_ms: u64,
    pub slow_query: SlowQueryConfig,
    /// Artificial delay after every statement
    pub delay_ms: Option<u64>,
    pub max_params: usize,
    pub mandatory_transaction: MandatoryTransactionConfig,
    pub capture_capacity: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            username: String::new(),
            password: String::new(),
            max_connections: 10,
            min_connections: 0,
            max_wait_ms: 30_000,
            slow_query: SlowQueryConfig::default(),
            delay_ms: None,
            max_params: DEFAULT_MAX_PARAMS,
            mandatory_transaction: MandatoryTransactionConfig::default(),
            capture_capacity: DEFAULT_CAPTURE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowQueryConfig {
    pub threshold_ms: u64,
    pub level: LogLevel,
}

impl Default for SlowQueryConfig {
    fn default() -> Self {
        Self {
            threshold_ms: 10_000,
            level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MandatoryTransactionConfig {
    pub enabled: bool,
    pub exempt_prefixes: Vec<String>,
}

impl Default for MandatoryTransactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exempt_prefixes: vec!["PRAGMA".to_string()],
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| ConnwatchError::Configuration(format!("Invalid harness config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading harness config");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Apply `CONNWATCH_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(ENV_URL) {
            self.url = url;
        }
        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = parse_override(ENV_MAX_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_WAIT_MS) {
            self.max_wait_ms = parse_override(ENV_MAX_WAIT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_DELAY_MS) {
            let delay: u64 = parse_override(ENV_DELAY_MS, &value)?;
            self.delay_ms = (delay > 0).then_some(delay);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConnwatchError::Configuration("url must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(ConnwatchError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConnwatchError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query.threshold_ms)
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(Duration::from_millis)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.min_connections, self.max_connections)
            .with_acquire_timeout_ms(self.max_wait_ms)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ConnwatchError::Configuration(format!("Invalid value '{}' for {}: {}", value, key, e))
    })
}
