//! Bounded-time execution on a dedicated worker thread.
//!
//! [`execute`] and [`execute_callable`] build a fresh [`SingleThreadExecutor`]
//! per call and shut it down on every exit path. A timed-out job is abandoned,
//! not stopped: the worker finishes it and then exits because its queue is
//! closed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Error;
use crate::registry;

type Job = Box<dyn FnOnce() + Send + 'static>;

static WORKER_SEQ: AtomicUsize = AtomicUsize::new(0);

/// An executor backed by exactly one registered worker thread.
///
/// Dropping the executor shuts it down: queued jobs still run, new
/// submissions are rejected, and the worker exits once the queue drains.
#[derive(Debug)]
pub struct SingleThreadExecutor {
    name: String,
    sender: Option<mpsc::Sender<Job>>,
}

impl SingleThreadExecutor {
    pub fn new() -> Result<Self, Error> {
        let name = format!(
            "testkit-worker-{}",
            WORKER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = name.clone();
        registry::spawn(name.clone(), move || {
            for job in receiver {
                job();
            }
            debug!(worker = %worker, "Worker queue closed, exiting");
        })?;
        debug!(worker = %name, "Executor started");
        Ok(Self {
            name,
            sender: Some(sender),
        })
    }

    /// Queue `work` on the worker thread.
    ///
    /// A panic inside `work` is captured and resumed by [`Task::get_timeout`].
    pub fn submit<T, F>(&self, work: F) -> Result<Task<T>, Error>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(Error::Rejected)?;
        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            // The submitter may have stopped waiting.
            let _ = result_tx.send(outcome);
        });
        sender.send(job).map_err(|_| Error::Rejected)?;
        Ok(Task {
            receiver: result_rx,
        })
    }

    /// Stop accepting work. Idempotent; does not wait for the worker.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_some() {
            debug!(worker = %self.name, "Executor shut down");
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.sender.is_none()
    }

    /// Name of the worker thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SingleThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pending result of a job submitted to a [`SingleThreadExecutor`].
#[derive(Debug)]
pub struct Task<T> {
    receiver: mpsc::Receiver<thread::Result<T>>,
}

impl<T> Task<T> {
    /// Wait up to `timeout` for the job's result.
    ///
    /// If the job panicked, the panic is resumed on the calling thread.
    pub fn get_timeout(self, timeout: Duration) -> Result<T, Error> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(RecvTimeoutError::Timeout) => Err(Error::TimedOut { budget: timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerLost),
        }
    }
}

/// Run `work` on a fresh worker thread, giving up after `max_time_ms`.
pub fn execute<F>(work: F, max_time_ms: u64) -> anyhow::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    execute_callable(
        move || {
            work();
            Ok(())
        },
        max_time_ms,
    )
}

/// Run `work` on a fresh worker thread and return its result.
///
/// - `Err` from `work` is returned as-is.
/// - A panic in `work` is resumed on the calling thread.
/// - Exceeding the budget returns [`Error::TimedOut`], recoverable with
///   `err.downcast_ref::<testkit::Error>()`.
pub fn execute_callable<T, F>(work: F, max_time_ms: u64) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let budget = Duration::from_millis(max_time_ms);
    // Dropping the executor shuts the worker down, unwinding included.
    let executor = SingleThreadExecutor::new()?;
    match executor.submit(work)?.get_timeout(budget) {
        Ok(result) => result,
        Err(err) => {
            if err.is_timeout() {
                warn!(
                    worker = %executor.name(),
                    ?budget,
                    "Work exceeded its time budget, abandoning it"
                );
            }
            Err(err.into())
        }
    }
}
