//! Where acquisition diagnostics are written

use connwatch_core::ConnwatchError;
use parking_lot::Mutex;
use thiserror::Error;

use crate::pool::PoolStats;

/// Failure while writing diagnostics
///
/// Never surfaced to the caller that failed to acquire a connection; the
/// recorder logs it and carries on.
#[derive(Error, Debug)]
pub enum DiagnosticEmissionError {
    #[error("diagnostic sink unavailable: {0}")]
    Unavailable(String),

    #[error("failed to write diagnostics: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives the diagnostics produced when a connection cannot be acquired
pub trait DiagnosticSink: Send + Sync {
    /// The acquisition failed; `max_size` is the pool's configured max-total
    fn acquisition_failed(
        &self,
        max_size: usize,
        stats: Option<PoolStats>,
        error: &ConnwatchError,
    ) -> Result<(), DiagnosticEmissionError>;

    /// The rendered report of recent acquisition stack traces
    fn trace_report(&self, report: &str) -> Result<(), DiagnosticEmissionError>;

    /// A full thread dump; sent at most once per [`DumpState`](super::DumpState)
    fn thread_dump(&self, dump: &str) -> Result<(), DiagnosticEmissionError>;
}

/// Writes diagnostics through `tracing` under the `connwatch::diagnostics` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn acquisition_failed(
        &self,
        max_size: usize,
        stats: Option<PoolStats>,
        error: &ConnwatchError,
    ) -> Result<(), DiagnosticEmissionError> {
        match stats {
            Some(stats) => tracing::error!(
                target: "connwatch::diagnostics",
                max_size,
                pool = %stats,
                error = %error,
                "Exceeded maximum wait for connection ({} max)",
                max_size
            ),
            None => tracing::error!(
                target: "connwatch::diagnostics",
                max_size,
                error = %error,
                "Exceeded maximum wait for connection ({} max)",
                max_size
            ),
        }
        Ok(())
    }

    fn trace_report(&self, report: &str) -> Result<(), DiagnosticEmissionError> {
        tracing::info!(target: "connwatch::diagnostics", "{}", report);
        Ok(())
    }

    fn thread_dump(&self, dump: &str) -> Result<(), DiagnosticEmissionError> {
        tracing::info!(target: "connwatch::diagnostics", "Thread dump:\n{}", dump);
        Ok(())
    }
}

/// A diagnostic emitted to a [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    AcquisitionFailed {
        max_size: usize,
        stats: Option<PoolStats>,
        error: String,
    },
    TraceReport(String),
    ThreadDump(String),
}

/// Keeps every diagnostic in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn trace_reports(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                DiagnosticEvent::TraceReport(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn thread_dumps(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, DiagnosticEvent::ThreadDump(_)))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, DiagnosticEvent::AcquisitionFailed { .. }))
            .count()
    }
}

impl DiagnosticSink for MemorySink {
    fn acquisition_failed(
        &self,
        max_size: usize,
        stats: Option<PoolStats>,
        error: &ConnwatchError,
    ) -> Result<(), DiagnosticEmissionError> {
        self.events.lock().push(DiagnosticEvent::AcquisitionFailed {
            max_size,
            stats,
            error: error.to_string(),
        });
        Ok(())
    }

    fn trace_report(&self, report: &str) -> Result<(), DiagnosticEmissionError> {
        self.events
            .lock()
            .push(DiagnosticEvent::TraceReport(report.to_string()));
        Ok(())
    }

    fn thread_dump(&self, dump: &str) -> Result<(), DiagnosticEmissionError> {
        self.events
            .lock()
            .push(DiagnosticEvent::ThreadDump(dump.to_string()));
        Ok(())
    }
}
