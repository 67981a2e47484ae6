//! Exponential backoff for workers waiting on new work.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Exponential backoff: spin first, then yield, then sleep.
///
/// Work tends to arrive in bursts, so a worker that just ran dry spins for a
/// few rounds before giving up its time slice.
#[derive(Debug)]
pub struct Backoff {
    step: AtomicUsize,
}

impl Backoff {
    const SPIN_LIMIT: usize = 6;
    const YIELD_LIMIT: usize = 10;

    /// Create a new backoff instance
    pub fn new() -> Self {
        Self {
            step: AtomicUsize::new(0),
        }
    }

    /// Reset the backoff to its initial state
    pub fn reset(&self) {
        self.step.store(0, Ordering::Relaxed);
    }

    /// Perform one step of backoff
    pub fn spin(&self) {
        let step = self.step.fetch_add(1, Ordering::Relaxed);

        if step <= Self::SPIN_LIMIT {
            for _ in 0..(1 << step.min(Self::SPIN_LIMIT)) {
                spin_loop();
            }
        } else if step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(Duration::from_micros(1));
        }
    }

    /// Check if we've escalated past spinning and yielding
    pub fn is_completed(&self) -> bool {
        self.step.load(Ordering::Relaxed) > Self::YIELD_LIMIT
    }

    /// Cheap wait for use once the queue has stayed empty a while
    pub fn snooze(&self) {
        if self.step.load(Ordering::Relaxed) <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(Duration::from_micros(10));
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
