//! Acquisition recorder layered over a data source

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use connwatch_core::{Connection, Result};

use super::buffer::{TraceBuffer, TraceSummary};
use super::dump::{DumpState, SystemThreadDumper, ThreadDumper};
use super::sink::{DiagnosticEmissionError, DiagnosticSink, TracingSink};
use super::trace::CapturedTrace;
use crate::datasource::DataSource;
use crate::pool::PoolStats;

/// Records who acquired connections, and explains pool exhaustion when it happens
///
/// Wraps any [`DataSource`]. Each successful acquisition stores the caller's
/// stack in a buffer sized to the wrapped source's `max_size`, so the buffer
/// holds one trace per connection that can be checked out at once. When the
/// wrapped source fails to hand out a connection the recorder logs the
/// failure, emits the stored traces newest first and, the first time for its
/// [`DumpState`], a full thread dump. The caller then receives the wrapped
/// source's original error.
///
/// # Example
///
/// ```ignore
/// use connwatch_connection::diagnostics::DiagnosticDataSource;
///
/// let source = DiagnosticDataSource::new(pool);
/// let conn = source.get_connection().await?;
/// ```
pub struct DiagnosticDataSource<D> {
    inner: D,
    traces: TraceBuffer,
    dump_state: Arc<DumpState>,
    sink: Arc<dyn DiagnosticSink>,
    dumper: Arc<dyn ThreadDumper>,
    failures: AtomicU64,
    reports: AtomicU64,
}

impl<D: DataSource> DiagnosticDataSource<D> {
    /// Wrap `inner`, logging through `tracing` and sharing the process-wide
    /// dump state
    pub fn new(inner: D) -> Self {
        let capacity = inner.max_size();
        Self {
            inner,
            traces: TraceBuffer::new(capacity),
            dump_state: DumpState::process(),
            sink: Arc::new(TracingSink),
            dumper: Arc::new(SystemThreadDumper),
            failures: AtomicU64::new(0),
            reports: AtomicU64::new(0),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_dump_state(mut self, dump_state: Arc<DumpState>) -> Self {
        self.dump_state = dump_state;
        self
    }

    pub fn with_thread_dumper(mut self, dumper: Arc<dyn ThreadDumper>) -> Self {
        self.dumper = dumper;
        self
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Number of traces kept; equal to the wrapped source's `max_size`
    pub fn capacity(&self) -> usize {
        self.traces.capacity()
    }

    /// Number of traces currently stored
    pub fn captured_count(&self) -> usize {
        self.traces.len()
    }

    /// Stored traces, newest first
    pub fn recent_traces(&self) -> Vec<TraceSummary> {
        self.traces.snapshot()
    }

    /// Number of failed acquisitions seen so far
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Number of times diagnostics have been reported
    pub fn report_count(&self) -> u64 {
        self.reports.load(Ordering::SeqCst)
    }

    pub fn dump_state(&self) -> &Arc<DumpState> {
        &self.dump_state
    }

    /// Emit the stored traces, newest first, and the thread dump if it has
    /// not been emitted yet
    pub fn report_diagnostics(&self) {
        self.reports.fetch_add(1, Ordering::SeqCst);

        let report = self.traces.render_newest_first();
        self.emit("trace report", self.sink.trace_report(&report));

        if self.dump_state.try_claim() {
            let dump = self.dumper.dump();
            self.emit("thread dump", self.sink.thread_dump(&dump));
        } else {
            tracing::debug!("thread dump already emitted, skipping");
        }
    }

    fn emit(&self, what: &'static str, result: std::result::Result<(), DiagnosticEmissionError>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, diagnostic = what, "failed to emit connection diagnostics");
        }
    }
}

#[async_trait]
impl<D: DataSource> DataSource for DiagnosticDataSource<D> {
    async fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        match self.inner.get_connection().await {
            Ok(connection) => {
                let sequence = self.traces.push(CapturedTrace::capture());
                tracing::trace!(sequence, "recorded connection acquisition");
                Ok(connection)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                let max_size = self.inner.max_size();
                self.emit(
                    "acquisition failure",
                    self.sink
                        .acquisition_failed(max_size, self.inner.stats(), &err),
                );
                self.report_diagnostics();
                Err(err)
            }
        }
    }

    fn max_size(&self) -> usize {
        self.inner.max_size()
    }

    fn stats(&self) -> Option<PoolStats> {
        self.inner.stats()
    }
}
