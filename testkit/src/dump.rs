//! Diagnostic stack dumps of live threads.
//!
//! A snapshot lists the activity frames a thread is blocked in (innermost
//! first). The calling thread's snapshot also carries a captured backtrace.
//!
//! Threads the testkit never saw (tokio workers, pool threads, plain
//! `std::thread` threads) are reported on Linux with no frames and under the
//! kernel's name, which is cut to 15 bytes: `"parallel-worker-1"` shows up as
//! `"parallel-worker"`.

use std::backtrace::Backtrace;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

use regex::Regex;
use tracing::warn;

use crate::error::Error;
use crate::registry::{self, OsThread, ThreadRecord};

/// Upper bound on the number of threads examined by one dump.
///
/// Registered threads come first, then unregistered OS threads; anything past
/// the first `MAX_DUMPED_THREADS` is skipped without notice.
pub const MAX_DUMPED_THREADS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub name: String,
    /// Rust thread id, known only for threads registered with the testkit.
    pub id: Option<ThreadId>,
    /// Kernel thread id, where the platform exposes one.
    pub tid: Option<u64>,
    /// Activity frames, innermost first.
    pub frames: Vec<String>,
    /// Native backtrace, only available for the thread that took the snapshot.
    pub backtrace: Option<String>,
}

impl fmt::Display for ThreadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{frame}")?;
        }
        write!(f, "]")?;
        if let Some(backtrace) = &self.backtrace {
            write!(f, "\n{backtrace}")?;
        }
        Ok(())
    }
}

/// Destination for stack dumps.
pub trait DiagnosticSink {
    fn thread_stack(&self, snapshot: &ThreadSnapshot);
}

/// Logs each snapshot as a `tracing` warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn thread_stack(&self, snapshot: &ThreadSnapshot) {
        warn!(
            thread = %snapshot.name,
            frames = snapshot.frames.len(),
            "Stack of thread {}: {snapshot}",
            snapshot.name
        );
    }
}

/// Log the stack of every live thread whose whole name matches `pattern`.
pub fn print_stack_trace(pattern: &str) -> Result<(), Error> {
    print_stack_trace_to(pattern, &TracingSink)
}

pub fn print_stack_trace_to(pattern: &str, sink: &dyn DiagnosticSink) -> Result<(), Error> {
    for snapshot in thread_snapshots(pattern)? {
        sink.thread_stack(&snapshot);
    }
    Ok(())
}

/// Snapshots of live threads whose whole name matches `pattern`.
///
/// Registered threads are listed in registration order, followed by the
/// remaining OS threads by kernel id. The calling thread is registered first,
/// so it is always a candidate.
pub fn thread_snapshots(pattern: &str) -> Result<Vec<ThreadSnapshot>, Error> {
    let pattern = full_match(pattern)?;
    let current = registry::current().id();
    let candidates = merge(registry::threads(), registry::os_threads());
    Ok(collect(&candidates, &pattern, MAX_DUMPED_THREADS, current))
}

enum Candidate {
    Registered(Arc<ThreadRecord>),
    Unregistered(OsThread),
}

impl Candidate {
    fn name(&self) -> &str {
        match self {
            Self::Registered(record) => record.name(),
            Self::Unregistered(thread) => &thread.name,
        }
    }
}

/// Registered threads, then OS threads whose kernel id no record claims.
fn merge(records: Vec<Arc<ThreadRecord>>, os_threads: Vec<OsThread>) -> Vec<Candidate> {
    let claimed: HashSet<u64> = records.iter().filter_map(|record| record.tid()).collect();
    records
        .into_iter()
        .map(Candidate::Registered)
        .chain(
            os_threads
                .into_iter()
                .filter(|thread| !claimed.contains(&thread.tid))
                .map(Candidate::Unregistered),
        )
        .collect()
}

fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    // Validate on its own first so a stray ')' cannot escape the anchoring group.
    Regex::new(pattern)?;
    Regex::new(&format!("^(?:{pattern})$"))
}

fn collect(
    candidates: &[Candidate],
    pattern: &Regex,
    cap: usize,
    current: ThreadId,
) -> Vec<ThreadSnapshot> {
    candidates
        .iter()
        .take(cap)
        .filter(|candidate| pattern.is_match(candidate.name()))
        .map(|candidate| snapshot(candidate, current))
        .collect()
}

fn snapshot(candidate: &Candidate, current: ThreadId) -> ThreadSnapshot {
    match candidate {
        Candidate::Registered(record) => ThreadSnapshot {
            name: record.name().to_owned(),
            id: Some(record.id()),
            tid: record.tid(),
            frames: record.frames(),
            backtrace: (record.id() == current).then(|| Backtrace::force_capture().to_string()),
        },
        Candidate::Unregistered(thread) => ThreadSnapshot {
            name: thread.name.clone(),
            id: None,
            tid: Some(thread.tid),
            frames: Vec::new(),
            backtrace: None,
        },
    }
}
