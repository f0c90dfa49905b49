//! Interrupt-aware synchronization primitives owned by test code.
//!
//! Both types are cheap handles over shared state: clone them into the
//! threads that need them.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::interrupt::{self, Interrupted, Waker};
use crate::lock;
use crate::registry;

/// Counting semaphore.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

#[derive(Debug)]
struct SemaphoreInner {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                permits: Mutex::new(permits),
                available: Condvar::new(),
            }),
        }
    }

    /// Block until a permit is available and take it.
    ///
    /// Fails without taking a permit if the calling thread is interrupted
    /// before or while waiting; the interrupt flag is cleared.
    pub fn acquire(&self) -> Result<(), Interrupted> {
        let _frame = registry::enter(format!(
            "Semaphore::acquire available={}",
            self.available_permits()
        ));
        let _blocker = interrupt::block_on(self.waker());
        let mut permits = lock(&self.inner.permits);
        loop {
            interrupt::check()?;
            if *permits > 0 {
                *permits -= 1;
                return Ok(());
            }
            permits = self
                .inner
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = lock(&self.inner.permits);
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    pub fn release(&self) {
        *lock(&self.inner.permits) += 1;
        // Every waiter rechecks: a woken waiter may leave on interrupt instead.
        self.inner.available.notify_all();
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        *lock(&self.inner.permits)
    }

    fn waker(&self) -> Waker {
        let inner = Arc::clone(&self.inner);
        Arc::new(move || {
            let _permits = lock(&inner.permits);
            inner.available.notify_all();
        })
    }
}

/// One-shot latch that opens once its count reaches zero.
#[derive(Debug, Clone)]
pub struct CountDownLatch {
    inner: Arc<LatchInner>,
}

#[derive(Debug)]
struct LatchInner {
    count: Mutex<u64>,
    opened: Condvar,
}

impl CountDownLatch {
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self {
            inner: Arc::new(LatchInner {
                count: Mutex::new(count),
                opened: Condvar::new(),
            }),
        }
    }

    /// Decrement the count, opening the latch when it reaches zero.
    /// A no-op on an open latch.
    pub fn count_down(&self) {
        let mut count = lock(&self.inner.count);
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.inner.opened.notify_all();
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        *lock(&self.inner.count)
    }

    /// Block until the latch opens.
    pub fn wait(&self) -> Result<(), Interrupted> {
        let _frame = registry::enter(format!("CountDownLatch::wait count={}", self.count()));
        self.wait_until(None).map(|_| ())
    }

    /// Block until the latch opens or `timeout` elapses.
    ///
    /// Returns `Ok(true)` if the latch opened and `Ok(false)` on timeout.
    /// Fails if the calling thread is interrupted before or while waiting;
    /// the interrupt flag is cleared.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, Interrupted> {
        let _frame = registry::enter(format!(
            "CountDownLatch::wait_timeout({timeout:?}) count={}",
            self.count()
        ));
        // Overflowing deadlines wait without a bound.
        self.wait_until(Instant::now().checked_add(timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool, Interrupted> {
        let _blocker = interrupt::block_on(self.waker());
        let mut count = lock(&self.inner.count);
        loop {
            interrupt::check()?;
            if *count == 0 {
                return Ok(true);
            }
            count = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    self.inner
                        .opened
                        .wait_timeout(count, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .opened
                    .wait(count)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn waker(&self) -> Waker {
        let inner = Arc::clone(&self.inner);
        Arc::new(move || {
            let _count = lock(&inner.count);
            inner.opened.notify_all();
        })
    }
}
