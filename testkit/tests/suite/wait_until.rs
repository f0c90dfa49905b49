//! Predicate polling tests

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use reactor_testkit::{POLL_INTERVAL, wait_until};

use crate::common::panic_message;

#[test]
fn counter_reaching_target_succeeds() {
    let counter = Arc::new(AtomicUsize::new(0));
    let writer = Arc::clone(&counter);
    let incrementer = thread::spawn(move || {
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(50));
            writer.fetch_add(1, Ordering::SeqCst);
        }
    });

    wait_until(
        "count reached: ",
        None,
        |c: &AtomicUsize| c.load(Ordering::SeqCst) == 5,
        &*counter,
        Duration::from_secs(5),
    )
    .expect("not interrupted");

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    incrementer.join().expect("join");
}

#[test]
fn succeeds_on_the_poll_that_first_sees_true() {
    let polls = Cell::new(0);
    let start = Instant::now();
    wait_until(
        "three polls",
        None,
        |polls: &Cell<u32>| {
            polls.set(polls.get() + 1);
            polls.get() == 3
        },
        &polls,
        Duration::from_secs(5),
    )
    .expect("not interrupted");

    assert_eq!(polls.get(), 3);
    assert!(start.elapsed() >= POLL_INTERVAL * 2);
}

#[test]
fn timeout_message_is_the_prefix() {
    let counter = AtomicUsize::new(0);
    let start = Instant::now();
    let payload = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = wait_until(
            "count reached: ",
            None,
            |c: &AtomicUsize| c.load(Ordering::SeqCst) == 5,
            &counter,
            Duration::from_millis(100),
        );
    }))
    .expect_err("times out");

    assert_eq!(panic_message(payload), "count reached: ");
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn timeout_message_appends_extra() {
    let counter = AtomicUsize::new(3);
    let extra = || format!("last={}", counter.load(Ordering::SeqCst));
    let payload = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = wait_until(
            "count reached: ",
            Some(&extra),
            |c: &AtomicUsize| c.load(Ordering::SeqCst) == 5,
            &counter,
            Duration::from_millis(50),
        );
    }))
    .expect_err("times out");

    assert_eq!(panic_message(payload), "count reached: last=3");
}

#[test]
#[should_panic(expected = "never ready")]
fn timeout_fails_the_test() {
    let _ = wait_until("never ready", None, |_: &()| false, &(), Duration::from_millis(20));
}
