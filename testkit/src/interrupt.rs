//! Cooperative thread interruption.
//!
//! Every registered thread carries an interrupt flag. [`InterruptHandle::interrupt`]
//! raises it, unparks the thread and wakes whatever primitive the thread is
//! blocked on. Interruptible waits check the flag on entry and after every
//! wakeup; when they observe it they clear it and return [`Interrupted`].
//! Helpers that want the status to survive (see [`crate::wait::sleep`])
//! raise it again before reporting the error.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::lock;
use crate::registry::{self, ThreadRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("thread was interrupted")]
pub struct Interrupted;

/// Wakes the primitive a thread is currently blocked on.
pub(crate) type Waker = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct InterruptState {
    flag: AtomicBool,
    thread: Thread,
    blocker: Mutex<Option<Waker>>,
}

impl InterruptState {
    pub(crate) fn new(thread: Thread) -> Self {
        Self {
            flag: AtomicBool::new(false),
            thread,
            blocker: Mutex::new(None),
        }
    }

    fn raise(&self) {
        self.flag.store(true, Ordering::Release);
        self.thread.unpark();
        // Clone out so the waker never runs under the blocker lock.
        let waker = lock(&self.blocker).clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for InterruptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptState")
            .field("flag", &self.is_set())
            .field("thread", &self.thread.id())
            .field("blocked", &lock(&self.blocker).is_some())
            .finish()
    }
}

/// Handle used to interrupt one specific thread from any other thread.
#[derive(Clone)]
pub struct InterruptHandle {
    record: Arc<ThreadRecord>,
}

impl InterruptHandle {
    /// Raise the interrupt flag of the target thread and wake it if blocked.
    pub fn interrupt(&self) {
        self.record.interrupt.raise();
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.record.interrupt.is_set()
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        self.record.name()
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("thread", &self.record.name())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Handle for the calling thread.
#[must_use]
pub fn current() -> InterruptHandle {
    InterruptHandle {
        record: registry::current(),
    }
}

/// Whether the calling thread's interrupt flag is raised. Does not clear it.
#[must_use]
pub fn is_interrupted() -> bool {
    registry::current().interrupt.is_set()
}

/// Test and clear the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    registry::current().interrupt.take()
}

pub(crate) fn check() -> Result<(), Interrupted> {
    if interrupted() {
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Park the calling thread for `duration` or until interrupted.
///
/// Spurious unparks are absorbed; the call returns no earlier than the
/// deadline unless the thread is interrupted.
pub fn park_for(duration: Duration) -> Result<(), Interrupted> {
    let record = registry::current();
    let deadline = Instant::now().checked_add(duration);
    loop {
        if record.interrupt.take() {
            return Err(Interrupted);
        }
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(());
                }
                thread::park_timeout(deadline - now);
            }
            None => thread::park(),
        }
    }
}

/// Clears the blocker registered by [`block_on`] on drop.
pub(crate) struct BlockerGuard {
    record: Arc<ThreadRecord>,
}

impl Drop for BlockerGuard {
    fn drop(&mut self) {
        *lock(&self.record.interrupt.blocker) = None;
    }
}

/// Register `waker` to run when the calling thread is interrupted.
///
/// Must be called before the primitive's own lock is taken: an interrupter
/// runs the waker, which locks the primitive.
pub(crate) fn block_on(waker: Waker) -> BlockerGuard {
    let record = registry::current();
    *lock(&record.interrupt.blocker) = Some(waker);
    BlockerGuard { record }
}
