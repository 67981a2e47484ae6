//! Worker identity and the per-worker run-loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::fiber::{Fiber, FiberState};
use crate::scheduler::task::{Task, TaskKind};
use crate::scheduler::{Scheduler, Shared};

/// Identity of one worker in the pool.
///
/// Dense indices `0..worker_threads`; with `use_caller` the constructing
/// thread is worker 0. Tasks pinned via affinity name one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub usize);

/// Per-worker counters
pub(crate) struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub fibers_resumed: AtomicU64,
}

impl WorkerState {
    pub(crate) fn new() -> Self {
        Self {
            tasks_executed: AtomicU64::new(0),
            fibers_resumed: AtomicU64::new(0),
        }
    }
}

pub(crate) struct Worker {
    id: WorkerId,
    shared: Arc<Shared>,
    is_root: bool,
    state: Arc<WorkerState>,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        shared: Arc<Shared>,
        is_root: bool,
        state: Arc<WorkerState>,
    ) -> Self {
        Self {
            id,
            shared,
            is_root,
            state,
        }
    }

    /// The run-loop. Entered once per worker; returns only when the
    /// scheduler has drained and may shut down.
    pub(crate) fn run(self) {
        crate::scheduler::bind_current(Scheduler::from_shared(self.shared.clone()), self.id);
        self.shared.running_workers.fetch_add(1, Ordering::AcqRel);
        log::debug!("{}: worker {} up", self.shared.config.name, self.id.0);

        loop {
            let mut claimed = None;
            let mut skipped_foreign = false;
            let mut drained = false;
            {
                let mut queue = self.shared.queue.lock();
                let mut pick = None;
                for (i, task) in queue.iter().enumerate() {
                    match task.affinity {
                        Some(owner) if owner != self.id => skipped_foreign = true,
                        _ => {
                            pick = Some(i);
                            break;
                        }
                    }
                }
                if let Some(i) = pick {
                    claimed = queue.remove(i);
                    // Claiming and the active transition happen under the
                    // queue lock, so the exit predicate below never observes
                    // a claimed task as "no work left".
                    self.shared.active_workers.fetch_add(1, Ordering::AcqRel);
                } else if queue.is_empty()
                    && self.shared.stopping.load(Ordering::Acquire)
                    && self.shared.active_workers.load(Ordering::Acquire) == 0
                {
                    drained = true;
                }
            }

            if skipped_foreign {
                // A task pinned to another worker sits in the queue; make
                // sure its owner is awake to claim it.
                self.shared.hooks.tickle();
            }

            if let Some(task) = claimed {
                self.execute(task);
                continue;
            }

            if drained && self.shared.hooks.quiescent() {
                break;
            }

            self.shared.idle_workers.fetch_add(1, Ordering::AcqRel);
            if self.is_root {
                // The caller's thread must not be parked here; hand control
                // back to start()/stop() instead.
                crate::fiber::yield_now();
            } else {
                self.shared.hooks.idle(self.shared.config.idle_timeout);
            }
            self.shared.idle_workers.fetch_sub(1, Ordering::AcqRel);
        }

        log::debug!("{}: worker {} down", self.shared.config.name, self.id.0);
        self.shared.running_workers.fetch_sub(1, Ordering::AcqRel);
        // Cascade the wake so peers still parked in idle re-check the exit
        // condition promptly.
        self.shared.hooks.tickle();
        crate::scheduler::clear_current();
    }

    fn execute(&self, task: Task) {
        let task_id = task.id;
        let affinity = task.affinity;
        let mut fiber = match task.kind {
            TaskKind::Fiber(fiber) => fiber,
            TaskKind::Call(job) => Fiber::new(self.shared.config.fiber_stack_size, job),
        };

        self.state.fibers_resumed.fetch_add(1, Ordering::Relaxed);

        match fiber.resume() {
            FiberState::Suspended => {
                // Back of the line for another turn, same pinning.
                self.shared.requeue(Task {
                    id: task_id,
                    kind: TaskKind::Fiber(fiber),
                    affinity,
                });
            }
            FiberState::Done => {
                self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
            }
            FiberState::Faulted => {
                log::warn!(
                    "{}: task {} discarded after panic",
                    self.shared.config.name,
                    task_id.as_u64()
                );
            }
            FiberState::Ready | FiberState::Running => {}
        }

        // A suspended fiber is requeued before the active count drops, so
        // the exit predicate cannot miss in-flight work.
        self.shared.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}
