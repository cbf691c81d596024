//! Counting semaphore bounding concurrent shard downloads.
//!
//! Workers may unpack and repair in parallel while only a few of them hold
//! a network transfer at any time.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A counting semaphore that limits concurrent access to a shared resource.
pub struct Semaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

/// RAII guard that releases one permit on drop.
pub struct SemaphoreGuard<'a>(&'a Semaphore);

impl Semaphore {
    /// Create a semaphore with `permits` initial permits (at least one).
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(permits.max(1)),
            cond: Condvar::new(),
        }
    }

    // A panicking holder cannot corrupt a plain counter
    fn count(&self) -> MutexGuard<'_, usize> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available, then acquire it.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut count = self.count();
        while *count == 0 {
            count = self
                .cond
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
        SemaphoreGuard(self)
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        *self.count()
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        *self.0.count() += 1;
        self.0.cond.notify_one();
    }
}
