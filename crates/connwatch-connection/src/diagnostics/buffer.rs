//! Bounded FIFO of acquisition traces

use std::collections::VecDeque;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::trace::CapturedTrace;

/// Lightweight view of a stored trace, without its frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    pub sequence: u64,
    pub thread: Option<String>,
    pub captured_at: DateTime<Utc>,
}

struct BufferState {
    traces: VecDeque<CapturedTrace>,
    next_sequence: u64,
}

/// Keeps the `capacity` most recent acquisition traces
///
/// Every read and write goes through one lock, so append-and-evict and
/// taking the set of traces to render are each atomic with respect to
/// concurrent acquisitions. Symbol lookup for a report happens on copies,
/// after the lock is released.
pub struct TraceBuffer {
    capacity: usize,
    state: Mutex<BufferState>,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BufferState {
                traces: VecDeque::with_capacity(capacity),
                next_sequence: 1,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a trace, evicting the oldest ones beyond capacity
    ///
    /// Returns the sequence number assigned to the trace. Sequence numbers
    /// start at 1 and follow insertion order.
    pub fn push(&self, mut trace: CapturedTrace) -> u64 {
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        trace.set_sequence(sequence);

        state.traces.push_back(trace);
        while state.traces.len() > self.capacity {
            state.traces.pop_front();
        }
        sequence
    }

    /// Summaries of the stored traces, newest first
    pub fn snapshot(&self) -> Vec<TraceSummary> {
        let state = self.state.lock();
        state
            .traces
            .iter()
            .rev()
            .map(|trace| TraceSummary {
                sequence: trace.sequence(),
                thread: trace.thread().map(str::to_string),
                captured_at: trace.captured_at(),
            })
            .collect()
    }

    /// Copies of the stored traces, newest first
    pub(crate) fn cloned_newest_first(&self) -> Vec<CapturedTrace> {
        self.state.lock().traces.iter().rev().cloned().collect()
    }

    /// Render every stored trace, newest first, as one report
    ///
    /// The set of traces is fixed when the call starts; acquisitions made
    /// while frames are being symbolized do not appear in the report.
    pub fn render_newest_first(&self) -> String {
        let mut traces = self.cloned_newest_first();
        if traces.is_empty() {
            return "No connection acquisitions recorded".to_string();
        }

        let mut out = String::new();
        for (index, trace) in traces.iter_mut().enumerate() {
            if index > 0 {
                out.push_str("\n\n");
            }
            let _ = write!(
                out,
                "Previous request stack trace {} (acquisition #{}, thread {}, at {}):",
                index,
                trace.sequence(),
                trace
                    .thread()
                    .map(|name| format!("\"{}\"", name))
                    .unwrap_or_else(|| "<unnamed>".to_string()),
                trace.captured_at().to_rfc3339(),
            );
            for frame in trace.frames() {
                let _ = write!(out, "\n   {}", frame);
            }
        }
        out
    }

    pub fn clear(&self) {
        self.state.lock().traces.clear();
    }
}
