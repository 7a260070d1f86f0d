//! Thread dumps and the emit-once policy that guards them

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use super::trace::CapturedTrace;

static PROCESS_DUMP_STATE: Lazy<Arc<DumpState>> = Lazy::new(|| Arc::new(DumpState::new()));

/// Remembers whether a full thread dump has already been emitted
///
/// The flag starts cleared, is set at most once and is never reset. Share one
/// instance between every recorder that should dump at most once together;
/// [`DumpState::process`] is the instance for the whole process.
#[derive(Debug, Default)]
pub struct DumpState {
    dumped: AtomicBool,
}

impl DumpState {
    pub const fn new() -> Self {
        Self {
            dumped: AtomicBool::new(false),
        }
    }

    /// The process-wide instance
    pub fn process() -> Arc<DumpState> {
        Arc::clone(&PROCESS_DUMP_STATE)
    }

    /// Claim the right to emit the dump
    ///
    /// Returns true for exactly one caller over the lifetime of this state.
    pub fn try_claim(&self) -> bool {
        self.dumped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_dumped(&self) -> bool {
        self.dumped.load(Ordering::Acquire)
    }
}

/// Produces a human-readable listing of the process's threads
pub trait ThreadDumper: Send + Sync {
    fn dump(&self) -> String;
}

/// Thread dumper backed by the operating system
///
/// On Linux every thread under `/proc/self/task` is listed with its name,
/// scheduler state and wait channel. The dumping thread's own stack follows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemThreadDumper;

impl ThreadDumper for SystemThreadDumper {
    fn dump(&self) -> String {
        let mut out = String::new();
        let threads = list_threads();
        let _ = write!(
            out,
            "Thread dump (pid {}, {} threads):",
            std::process::id(),
            threads.len()
        );
        for thread in &threads {
            let _ = write!(out, "\n{}", thread);
        }

        let mut current = CapturedTrace::capture();
        let _ = write!(
            out,
            "\n\nDumping thread \"{}\":",
            current.thread().unwrap_or("<unnamed>")
        );
        for frame in current.frames() {
            let _ = write!(out, "\n   {}", frame);
        }
        out
    }
}

/// One line of the OS thread listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEntry {
    pub tid: u64,
    pub name: String,
    /// Single-letter scheduler state as reported by the kernel (R, S, D, ...)
    pub state: Option<char>,
    pub wait_channel: Option<String>,
}

impl std::fmt::Display for ThreadEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\" tid={}", self.name, self.tid)?;
        if let Some(state) = self.state {
            write!(f, " state={} ({})", state, describe_state(state))?;
        }
        if let Some(wchan) = &self.wait_channel {
            write!(f, " wchan={}", wchan)?;
        }
        Ok(())
    }
}

fn describe_state(state: char) -> &'static str {
    match state {
        'R' => "running",
        'S' => "sleeping",
        'D' => "uninterruptible wait",
        'T' | 't' => "stopped",
        'Z' => "zombie",
        'X' => "dead",
        'I' => "idle",
        _ => "unknown",
    }
}

/// Pull the state letter out of a `/proc/<pid>/task/<tid>/stat` line
///
/// The command name sits in parentheses and may itself contain spaces or
/// parentheses, so the state is the first field after the last `)`.
pub(crate) fn parse_stat_state(stat: &str) -> Option<char> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().next()?.chars().next()
}

#[cfg(target_os = "linux")]
fn list_threads() -> Vec<ThreadEntry> {
    let entries = match std::fs::read_dir("/proc/self/task") {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(error = %e, "cannot enumerate threads");
            return Vec::new();
        }
    };

    let mut threads: Vec<ThreadEntry> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let tid = entry.file_name().to_str()?.parse::<u64>().ok()?;
            let dir = entry.path();
            let name = std::fs::read_to_string(dir.join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "<unknown>".to_string());
            let state = std::fs::read_to_string(dir.join("stat"))
                .ok()
                .and_then(|stat| parse_stat_state(&stat));
            let wait_channel = std::fs::read_to_string(dir.join("wchan"))
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && s != "0");
            Some(ThreadEntry {
                tid,
                name,
                state,
                wait_channel,
            })
        })
        .collect();
    threads.sort_by_key(|t| t.tid);
    threads
}

#[cfg(not(target_os = "linux"))]
fn list_threads() -> Vec<ThreadEntry> {
    Vec::new()
}
