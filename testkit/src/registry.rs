//! Process-wide registry of threads known to the testkit.
//!
//! Rust offers no way to sample another thread's stack, so threads register
//! themselves the first time they use a helper (or at startup when launched
//! through [`spawn`]) and deregister when they exit. While blocked inside a
//! helper a thread pushes an activity frame; the frames of a thread form its
//! stack snapshot.
//!
//! Threads that never touch the testkit are still listed by [`os_threads`]
//! on Linux, from `/proc/self/task`. The kernel keeps at most 15 bytes of a
//! thread name there, so such threads are known only by the truncated name.

use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::{self, JoinHandle, Thread, ThreadId};

use tracing::debug;

use crate::error::Error;
use crate::interrupt::InterruptState;
use crate::lock;

static REGISTRY: LazyLock<Mutex<Vec<Arc<ThreadRecord>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));

thread_local! {
    static LOCAL: Registration = Registration::register();
}

#[derive(Debug)]
pub(crate) struct ThreadRecord {
    name: String,
    id: ThreadId,
    tid: Option<u64>,
    pub(crate) interrupt: InterruptState,
    frames: Mutex<Vec<String>>,
}

impl ThreadRecord {
    pub(crate) fn new(name: String, thread: Thread, tid: Option<u64>) -> Self {
        Self {
            name,
            id: thread.id(),
            tid,
            interrupt: InterruptState::new(thread),
            frames: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    /// Kernel thread id, when the platform exposes one.
    pub(crate) fn tid(&self) -> Option<u64> {
        self.tid
    }

    /// Activity frames, innermost first.
    pub(crate) fn frames(&self) -> Vec<String> {
        lock(&self.frames).iter().rev().cloned().collect()
    }

    fn push(&self, frame: String) {
        lock(&self.frames).push(frame);
    }

    fn pop(&self) {
        lock(&self.frames).pop();
    }
}

struct Registration {
    record: Arc<ThreadRecord>,
}

impl Registration {
    fn register() -> Self {
        let thread = thread::current();
        let name = thread
            .name()
            .map_or_else(|| format!("{:?}", thread.id()), ToOwned::to_owned);
        let record = Arc::new(ThreadRecord::new(name, thread, current_tid()));
        lock(&REGISTRY).push(Arc::clone(&record));
        Self { record }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        lock(&REGISTRY).retain(|record| !Arc::ptr_eq(record, &self.record));
    }
}

/// The calling thread's record, registering the thread on first use.
pub(crate) fn current() -> Arc<ThreadRecord> {
    LOCAL.with(|registration| Arc::clone(&registration.record))
}

/// Registered threads in registration order.
pub(crate) fn threads() -> Vec<Arc<ThreadRecord>> {
    lock(&REGISTRY).clone()
}

/// A live thread of this process as the kernel reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OsThread {
    pub(crate) tid: u64,
    /// `comm` name, truncated by the kernel to 15 bytes.
    pub(crate) name: String,
}

/// Live threads of this process, ordered by kernel thread id.
///
/// Empty where `/proc/self/task` is unavailable.
pub(crate) fn os_threads() -> Vec<OsThread> {
    let entries = match fs::read_dir("/proc/self/task") {
        Ok(entries) => entries,
        Err(err) => {
            debug!(error = %err, "Cannot list OS threads");
            return Vec::new();
        }
    };

    let mut threads: Vec<OsThread> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let tid = entry.file_name().to_str()?.parse().ok()?;
            // The thread may exit between listing and reading its name.
            let comm = fs::read_to_string(entry.path().join("comm")).ok()?;
            Some(OsThread {
                tid,
                name: comm.trim_end_matches('\n').to_owned(),
            })
        })
        .collect();
    threads.sort_by_key(|thread| thread.tid);
    threads
}

/// Kernel thread id of the calling thread, from `/proc/thread-self`.
fn current_tid() -> Option<u64> {
    let target = fs::read_link("/proc/thread-self").ok()?;
    parse_tid(&target)
}

/// Last component of a `<pid>/task/<tid>` link target.
fn parse_tid(target: &Path) -> Option<u64> {
    target.file_name()?.to_str()?.parse().ok()
}

/// Pops its frame from the owning thread's activity stack on drop.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub(crate) struct ActivityFrame {
    record: Arc<ThreadRecord>,
}

impl Drop for ActivityFrame {
    fn drop(&mut self) {
        self.record.pop();
    }
}

pub(crate) fn enter(frame: impl Into<String>) -> ActivityFrame {
    let record = current();
    record.push(frame.into());
    ActivityFrame { record }
}

/// Spawn a named thread that is registered before this function returns.
///
/// The thread is visible to [`crate::dump`] for its entire lifetime, which
/// makes it safe to dump stacks right after spawning.
pub fn spawn<F, T>(name: impl Into<String>, f: F) -> Result<JoinHandle<T>, Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let (registered_tx, registered_rx) = mpsc::sync_channel(1);
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            current();
            let _ = registered_tx.send(());
            f()
        })
        .map_err(|source| Error::Spawn {
            name: name.clone(),
            source,
        })?;
    // Only fails if the thread died before registering; the join handle reports that.
    let _ = registered_rx.recv();
    debug!(thread = %name, "Spawned registered thread");
    Ok(handle)
}
