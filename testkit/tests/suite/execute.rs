//! Bounded execution tests

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use reactor_testkit::{CountDownLatch, Error, execute, execute_callable};

use crate::common::{panic_message, thread_registered, wait_for_thread_exit};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("work failed with code {0}")]
struct WorkFailure(u32);

fn worker_name() -> String {
    thread::current()
        .name()
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

#[test]
fn result_is_returned_and_worker_released() {
    let worker = execute_callable(|| Ok(worker_name()), 5_000).expect("completes");
    assert!(worker.starts_with("testkit-worker-"), "{worker}");
    wait_for_thread_exit(&worker);
}

#[test]
fn procedure_form_runs_the_work() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    execute(move || flag.store(true, Ordering::SeqCst), 5_000).expect("completes");
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn timeout_is_distinguishable_and_worker_released() {
    let gate = CountDownLatch::new(1);
    let waiting = gate.clone();
    let (name_tx, name_rx) = mpsc::channel();

    let start = Instant::now();
    let err = execute(
        move || {
            name_tx.send(worker_name()).expect("send name");
            let _ = waiting.wait();
        },
        50,
    )
    .expect_err("times out");
    assert!(start.elapsed() >= Duration::from_millis(50));

    let kind = err.downcast_ref::<Error>().expect("testkit error");
    assert!(matches!(kind, Error::TimedOut { budget } if *budget == Duration::from_millis(50)));

    // The abandoned job keeps its worker alive until it finishes.
    let worker = name_rx.recv().expect("worker name");
    assert!(thread_registered(&worker));
    gate.count_down();
    wait_for_thread_exit(&worker);
}

#[test]
fn work_error_is_propagated_unchanged() {
    let (name_tx, name_rx) = mpsc::channel();
    let err = execute_callable(
        move || -> anyhow::Result<u32> {
            name_tx.send(worker_name()).expect("send name");
            Err(WorkFailure(7).into())
        },
        5_000,
    )
    .expect_err("work fails");

    assert_eq!(err.downcast_ref::<WorkFailure>(), Some(&WorkFailure(7)));
    assert!(err.downcast_ref::<Error>().is_none());
    wait_for_thread_exit(&name_rx.recv().expect("worker name"));
}

#[test]
fn work_panic_is_resumed_on_caller() {
    let (name_tx, name_rx) = mpsc::channel();
    let payload = panic::catch_unwind(AssertUnwindSafe(move || {
        execute(
            move || {
                name_tx.send(worker_name()).expect("send name");
                panic!("worker exploded");
            },
            5_000,
        )
    }))
    .expect_err("panics");

    assert_eq!(panic_message(payload), "worker exploded");
    wait_for_thread_exit(&name_rx.recv().expect("worker name"));
}
