//! Call-stack snapshots taken at connection acquisition

use std::fmt;

use backtrace::Backtrace;
use chrono::{DateTime, Utc};

/// One frame of a captured call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Demangled function path, or the instruction pointer when unsymbolized
    pub unit: String,
    /// Source file, when debug info is available
    pub location: Option<String>,
    pub line: Option<u32>,
}

impl TraceFrame {
    pub fn new(unit: impl Into<String>, location: Option<String>, line: Option<u32>) -> Self {
        Self {
            unit: unit.into(),
            location,
            line,
        }
    }
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.location, self.line) {
            (Some(location), Some(line)) => write!(f, "{}({}:{})", self.unit, location, line),
            (Some(location), None) => write!(f, "{}({})", self.unit, location),
            _ => write!(f, "{}(Unknown Source)", self.unit),
        }
    }
}

#[derive(Clone)]
enum Frames {
    /// Raw instruction pointers; symbolized the first time they are read
    Unresolved(Backtrace),
    Resolved(Vec<TraceFrame>),
}

/// The call path that was active when a connection was handed out
#[derive(Clone)]
pub struct CapturedTrace {
    sequence: u64,
    thread: Option<String>,
    captured_at: DateTime<Utc>,
    frames: Frames,
}

impl CapturedTrace {
    /// Snapshot the current call stack
    ///
    /// Only instruction pointers are recorded here; symbol lookup is deferred
    /// to [`frames`](Self::frames) so the acquisition path stays cheap.
    pub fn capture() -> Self {
        Self {
            sequence: 0,
            thread: current_thread_name(),
            captured_at: Utc::now(),
            frames: Frames::Unresolved(Backtrace::new_unresolved()),
        }
    }

    /// Build a trace from already-known frames
    pub fn from_frames(frames: Vec<TraceFrame>) -> Self {
        Self {
            sequence: 0,
            thread: current_thread_name(),
            captured_at: Utc::now(),
            frames: Frames::Resolved(frames),
        }
    }

    /// Acquisition order, assigned by the buffer the trace is stored in
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Frames of the call stack, innermost first
    pub fn frames(&mut self) -> &[TraceFrame] {
        if let Frames::Unresolved(backtrace) = &mut self.frames {
            backtrace.resolve();
            let frames = symbolize(backtrace);
            self.frames = Frames::Resolved(frames);
        }
        match &self.frames {
            Frames::Resolved(frames) => frames,
            Frames::Unresolved(_) => &[],
        }
    }
}

impl fmt::Debug for CapturedTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedTrace")
            .field("sequence", &self.sequence)
            .field("thread", &self.thread)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

fn current_thread_name() -> Option<String> {
    std::thread::current().name().map(str::to_string)
}

/// Turn a resolved backtrace into frames, dropping the capture machinery
/// itself from the top of the stack
fn symbolize(backtrace: &Backtrace) -> Vec<TraceFrame> {
    let mut frames = Vec::new();
    for frame in backtrace.frames() {
        let symbols = frame.symbols();
        if symbols.is_empty() {
            frames.push(TraceFrame::new(format!("{:?}", frame.ip()), None, None));
            continue;
        }
        for symbol in symbols {
            let unit = symbol
                .name()
                .map(|name| format!("{:#}", name))
                .unwrap_or_else(|| format!("{:?}", frame.ip()));
            let location = symbol.filename().map(|path| path.display().to_string());
            frames.push(TraceFrame::new(unit, location, symbol.lineno()));
        }
    }

    let skip = frames
        .iter()
        .take_while(|frame| is_capture_frame(&frame.unit))
        .count();
    frames.drain(..skip);
    frames
}

fn is_capture_frame(unit: &str) -> bool {
    unit.starts_with("backtrace::") || unit.contains("CapturedTrace::capture")
}
