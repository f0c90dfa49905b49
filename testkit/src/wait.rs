//! Blocking waits with assertion-style timeouts.
//!
//! Timeouts in [`wait_until`] and [`wait_for_latch`] are test failures and
//! therefore panic with the caller's location. Interruption is an ordinary
//! error and is returned.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::Error;
use crate::interrupt::{self, Interrupted};
use crate::registry;
use crate::sync::{CountDownLatch, Semaphore};

/// Delay between predicate evaluations in [`wait_until`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fail the current test with `message`.
#[track_caller]
pub fn fail(message: &str) -> ! {
    panic!("{message}")
}

/// Suspend the calling thread for at least `duration`.
///
/// If the thread is interrupted the interrupt status is restored before
/// returning [`Error::Interrupted`], so callers further up still observe it.
pub fn sleep(duration: Duration) -> Result<(), Error> {
    let _frame = registry::enter(format!("sleep({duration:?})"));
    interrupt::park_for(duration).map_err(|source| reinterrupt("sleep", source))
}

pub fn sleep_millis(millis: u64) -> Result<(), Error> {
    sleep(Duration::from_millis(millis))
}

/// Take one permit from `semaphore`, blocking without a time bound.
///
/// Interruption is reported like [`sleep`] does.
pub fn acquire_semaphore(semaphore: &Semaphore) -> Result<(), Error> {
    semaphore
        .acquire()
        .map_err(|source| reinterrupt("semaphore acquire", source))
}

fn reinterrupt(during: &'static str, source: Interrupted) -> Error {
    interrupt::current().interrupt();
    debug!(during, "Interrupted; interrupt status restored");
    Error::Interrupted { during, source }
}

/// Poll `predicate` against `arg` every [`POLL_INTERVAL`] until it holds.
///
/// The deadline is fixed at entry. When it passes the test fails with
/// `message`, followed by the output of `extra` if one is given; `extra` is
/// only evaluated on failure.
#[track_caller]
pub fn wait_until<T, P>(
    message: &str,
    extra: Option<&dyn Fn() -> String>,
    mut predicate: P,
    arg: &T,
    duration: Duration,
) -> Result<(), Error>
where
    T: ?Sized,
    P: FnMut(&T) -> bool,
{
    let _frame = registry::enter(format!("wait_until({message:?}, {duration:?})"));
    let deadline = Instant::now().checked_add(duration);
    while deadline.is_none_or(|deadline| Instant::now() < deadline) {
        if predicate(arg) {
            return Ok(());
        }
        sleep(POLL_INTERVAL)?;
    }

    let mut failure = message.to_owned();
    if let Some(extra) = extra {
        failure.push_str(&extra());
    }
    fail(&failure)
}

/// Wait for `latch` to open, failing the test after `duration`.
///
/// The failure message is `"{prefix}, remaining={count}"`. Interruption is
/// passed through as the latch reports it.
#[track_caller]
pub fn wait_for_latch(
    prefix: &str,
    latch: &CountDownLatch,
    duration: Duration,
) -> Result<(), Interrupted> {
    if !latch.wait_timeout(duration)? {
        fail(&format!("{prefix}, remaining={}", latch.count()));
    }
    Ok(())
}
