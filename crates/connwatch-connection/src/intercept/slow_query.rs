//! Slow statement logging

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::listener::{ExecutionInfo, QueryInfo, QueryListener};

/// Level at which slow statements are logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Logs every statement whose execution took at least `threshold`
pub struct SlowQueryLogger {
    threshold: Duration,
    level: LogLevel,
    slow_count: AtomicU64,
}

impl SlowQueryLogger {
    pub fn new(threshold: Duration, level: LogLevel) -> Self {
        Self {
            threshold,
            level,
            slow_count: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Number of statements logged as slow so far
    pub fn slow_count(&self) -> u64 {
        self.slow_count.load(Ordering::SeqCst)
    }
}

macro_rules! log_slow {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!(target: "connwatch::slow_query", $($arg)+),
            LogLevel::Debug => tracing::debug!(target: "connwatch::slow_query", $($arg)+),
            LogLevel::Info => tracing::info!(target: "connwatch::slow_query", $($arg)+),
            LogLevel::Warn => tracing::warn!(target: "connwatch::slow_query", $($arg)+),
            LogLevel::Error => tracing::error!(target: "connwatch::slow_query", $($arg)+),
        }
    };
}

#[async_trait]
impl QueryListener for SlowQueryLogger {
    async fn after_query(&self, info: &QueryInfo, execution: &ExecutionInfo) {
        if execution.elapsed < self.threshold {
            return;
        }
        self.slow_count.fetch_add(1, Ordering::SeqCst);
        log_slow!(
            self.level,
            connection_id = info.connection_id,
            elapsed_ms = execution.elapsed.as_millis() as u64,
            threshold_ms = self.threshold.as_millis() as u64,
            success = execution.success,
            params = info.param_count(),
            sql = %info.sql,
            "slow query"
        );
    }
}
