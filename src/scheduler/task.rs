//! Task representation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fiber::Fiber;
use crate::scheduler::worker::WorkerId;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for diagnostics
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Payload of a task: a fiber resumed across turns, or a one-shot callback
/// that gets wrapped in a fresh fiber when a worker picks it up.
///
/// There is deliberately no empty variant; a task always carries something
/// runnable.
pub(crate) enum TaskKind {
    Fiber(Fiber),
    Call(Job),
}

/// The unit of schedulable work.
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) kind: TaskKind,
    pub(crate) affinity: Option<WorkerId>,
}

impl Task {
    /// Create a task from a plain callback, runnable by any worker.
    pub fn call<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            kind: TaskKind::Call(Box::new(f)),
            affinity: None,
        }
    }

    /// Create a task from an existing fiber, runnable by any worker.
    pub fn fiber(fiber: Fiber) -> Self {
        Task {
            id: TaskId::next(),
            kind: TaskKind::Fiber(fiber),
            affinity: None,
        }
    }

    /// Pin this task to one specific worker.
    pub fn with_affinity(mut self, worker: WorkerId) -> Self {
        self.affinity = Some(worker);
        self
    }

    /// The task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The worker this task is pinned to, if any
    pub fn affinity(&self) -> Option<WorkerId> {
        self.affinity
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TaskKind::Fiber(_) => "fiber",
            TaskKind::Call(_) => "call",
        };
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &kind)
            .field("affinity", &self.affinity)
            .finish()
    }
}
