//! Connection acquisition diagnostics
//!
//! [`DiagnosticDataSource`] sits in front of a pool and answers the question
//! "who is holding all the connections?" when the pool runs dry. It keeps the
//! stacks of the most recent acquisitions and, on an acquisition failure,
//! writes them out newest first together with a one-time thread dump.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use connwatch_connection::diagnostics::{DiagnosticDataSource, DumpState, TracingSink};
//!
//! let source = DiagnosticDataSource::new(pool)
//!     .with_dump_state(DumpState::process())
//!     .with_sink(Arc::new(TracingSink));
//! ```

mod buffer;
mod dump;
mod recorder;
mod sink;
mod trace;


pub use buffer::{TraceBuffer, TraceSummary};
pub use dump::{DumpState, SystemThreadDumper, ThreadDumper, ThreadEntry};
pub use recorder::DiagnosticDataSource;
pub use sink::{DiagnosticEmissionError, DiagnosticEvent, DiagnosticSink, MemorySink, TracingSink};
pub use trace::{CapturedTrace, TraceFrame};
