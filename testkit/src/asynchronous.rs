//! Tokio counterparts of the blocking helpers.
//!
//! These never block a runtime thread. Timeouts are test failures and panic,
//! like their blocking twins.
//!
//! `#[track_caller]` does not reach through an `async fn`, so a failing wait
//! reports its panic location inside this module. The panic message is
//! exactly the caller's text, so `#[should_panic(expected = ...)]` and the
//! test output still identify which wait gave up.

use std::future::Future;
use std::panic;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::warn;

use crate::error::Error;
use crate::wait::{POLL_INTERVAL, fail};

/// Poll `predicate` against `arg` every [`POLL_INTERVAL`] until it holds,
/// failing the test with `message` (plus `extra()` if given) after `duration`.
///
/// The panic location points here, not at the awaiting test.
pub async fn wait_until<T, P>(
    message: &str,
    extra: Option<&(dyn Fn() -> String + Sync)>,
    mut predicate: P,
    arg: &T,
    duration: Duration,
) where
    T: ?Sized + Sync,
    P: FnMut(&T) -> bool,
{
    let deadline = Instant::now().checked_add(duration);
    while deadline.is_none_or(|deadline| Instant::now() < deadline) {
        if predicate(arg) {
            return;
        }
        time::sleep(POLL_INTERVAL).await;
    }

    let mut failure = message.to_owned();
    if let Some(extra) = extra {
        failure.push_str(&extra());
    }
    fail(&failure);
}

/// Wait for a notification on `notify`, failing the test with `message` after
/// `duration`.
///
/// A permit stored by an earlier `notify_one` completes the wait immediately;
/// `notify_waiters` only reaches waits already in progress. As with
/// [`wait_until`], the panic location points here.
pub async fn wait_for_notify(message: &str, notify: &Notify, duration: Duration) {
    if time::timeout(duration, notify.notified()).await.is_err() {
        fail(message);
    }
}

/// Run `future` as its own task, giving up after `max_time`.
///
/// On timeout the task is detached, not aborted. A panic inside the task is
/// resumed on the caller.
pub async fn execute<F, T>(future: F, max_time: Duration) -> Result<T, Error>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(future);
    match time::timeout(max_time, task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_err)) if join_err.is_panic() => panic::resume_unwind(join_err.into_panic()),
        Ok(Err(_)) => Err(Error::WorkerLost),
        Err(_) => {
            warn!(budget = ?max_time, "Task exceeded its time budget, detaching it");
            Err(Error::TimedOut { budget: max_time })
        }
    }
}
