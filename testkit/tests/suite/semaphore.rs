//! Semaphore acquire tests

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reactor_testkit::{Error, Semaphore, acquire_semaphore, interrupt, spawn};

#[test]
fn acquire_takes_one_permit() {
    let semaphore = Semaphore::new(2);
    acquire_semaphore(&semaphore).expect("acquire");
    assert_eq!(semaphore.available_permits(), 1);
    acquire_semaphore(&semaphore).expect("acquire");
    assert_eq!(semaphore.available_permits(), 0);
}

#[test]
fn acquire_waits_for_a_release() {
    let semaphore = Semaphore::new(0);
    let releaser = semaphore.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        releaser.release();
    });

    acquire_semaphore(&semaphore).expect("acquire");
    assert_eq!(semaphore.available_permits(), 0);
    worker.join().expect("join");
}

#[test]
fn interrupted_acquire_restores_flag_and_keeps_permits() {
    let semaphore = Semaphore::new(0);
    let waiting = semaphore.clone();
    let (handle_tx, handle_rx) = mpsc::channel();
    let waiter = spawn("semaphore-probe-interrupted", move || {
        handle_tx
            .send(interrupt::current())
            .expect("send handle");
        let outcome = acquire_semaphore(&waiting);
        (outcome, interrupt::is_interrupted())
    })
    .expect("spawn");

    handle_rx.recv().expect("handle").interrupt();

    let (outcome, flagged) = waiter.join().expect("join");
    assert!(matches!(
        outcome,
        Err(Error::Interrupted {
            during: "semaphore acquire",
            ..
        })
    ));
    assert!(flagged);

    semaphore.release();
    assert_eq!(semaphore.available_permits(), 1);
}
