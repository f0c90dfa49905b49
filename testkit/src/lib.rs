//! Test-support helpers for Reactor.
//!
//! This crate collects the small concurrency conveniences that integration
//! tests keep reaching for:
//!
//! - **`wait`**: Interruptible sleep, semaphore acquire, predicate polling and
//!   latch waits with assertion-style timeouts
//! - **`executor`**: Run a unit of work on a fresh worker thread under a hard
//!   time budget
//! - **`dump`**: Log the activity stack of every live thread whose name
//!   matches a pattern
//! - **`interrupt`** / **`sync`**: Cooperative thread interruption and the
//!   `Semaphore` / `CountDownLatch` primitives that honor it
//! - **`asynchronous`**: Tokio counterparts of the waits and bounded execution
//!
//! [`dump`] reports every live thread. Threads that touched these helpers, or
//! were started through [`spawn`], also show what they are blocked in.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "tokio")]
pub mod asynchronous;
pub mod config;
pub mod dump;
mod error;
pub mod executor;
pub mod interrupt;
pub mod logging;
mod registry;
pub mod sync;
pub mod wait;

pub use config::{ConfigError, LoggingConfig, TestkitConfig};
pub use dump::{
    DiagnosticSink, MAX_DUMPED_THREADS, ThreadSnapshot, TracingSink, print_stack_trace,
    print_stack_trace_to, thread_snapshots,
};
pub use error::Error;
pub use executor::{SingleThreadExecutor, Task, execute, execute_callable};
pub use interrupt::{InterruptHandle, Interrupted};
pub use registry::spawn;
pub use sync::{CountDownLatch, Semaphore};
pub use wait::{
    POLL_INTERVAL, acquire_semaphore, fail, sleep, sleep_millis, wait_for_latch, wait_until,
};

/// Lock a mutex, recovering the guard if another thread panicked while holding it.
///
/// Panicking is the normal failure mode in tests, so a poisoned lock must not
/// cascade into unrelated helpers.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
