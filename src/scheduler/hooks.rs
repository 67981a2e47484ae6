//! Scheduler extension points.
//!
//! The scheduler never decides *how* an idle worker waits or how it is woken;
//! it calls into a [`SchedulerHooks`] implementation injected at construction.
//! A derived scheduler (say, one that parks workers on an I/O reactor) swaps
//! in its own implementation instead of subclassing anything.

use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::util::Backoff;

/// Behavior injected into the scheduler's run-loops.
pub trait SchedulerHooks: Send + Sync + 'static {
    /// Wake workers that may be parked in [`idle`](Self::idle).
    ///
    /// Called when the queue goes empty to non-empty, when a worker skips a
    /// task pinned to a different worker, and while shutting down. The
    /// default does nothing; the bounded `idle` wait absorbs the latency.
    fn tickle(&self) {}

    /// Called by a worker that found no eligible task.
    ///
    /// Implementations may block, but must return within roughly `timeout`
    /// so the worker re-checks the queue and the exit condition.
    fn idle(&self, timeout: Duration);

    /// Extra condition that must hold before workers are allowed to exit.
    ///
    /// A derived scheduler tracking external state (pending I/O, timers)
    /// returns false here until that state has drained.
    fn quiescent(&self) -> bool {
        true
    }
}

/// Default hooks: no wake signal, idle workers back off then nap.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl SchedulerHooks for DefaultHooks {
    fn idle(&self, timeout: Duration) {
        // Spin briefly first; submissions tend to arrive in bursts.
        let backoff = Backoff::new();
        while !backoff.is_completed() {
            backoff.spin();
        }
        thread::park_timeout(timeout);
    }
}

/// Condvar-based hooks: `tickle` wakes every parked worker immediately.
///
/// Lower wake latency than [`DefaultHooks`] at the cost of a mutex handshake
/// per idle round. A tickle that lands between a worker's queue scan and its
/// wait is absorbed by the bounded timeout.
#[derive(Debug, Default)]
pub struct ParkHooks {
    lock: Mutex<()>,
    cv: Condvar,
}

impl ParkHooks {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulerHooks for ParkHooks {
    fn tickle(&self) {
        self.cv.notify_all();
    }

    fn idle(&self, timeout: Duration) {
        let mut guard = self.lock.lock();
        let _ = self.cv.wait_for(&mut guard, timeout);
    }
}
