//! The scheduler: task queue, worker pool, and lifecycle.
//!
//! A [`Scheduler`] multiplexes submitted [`Task`]s onto a fixed pool of
//! worker threads. Fibers that suspend are requeued for a later turn;
//! callbacks run once inside a fresh fiber. Tasks may be pinned to one
//! worker via [`WorkerId`] affinity, and the pool's waiting/waking behavior
//! is swappable through [`SchedulerHooks`].

pub mod hooks;
pub mod task;
pub mod worker;

pub use hooks::{DefaultHooks, ParkHooks, SchedulerHooks};
pub use task::{Task, TaskId};
pub use worker::WorkerId;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fiber::Fiber;
use crate::scheduler::worker::{Worker, WorkerState};

#[cfg(target_os = "linux")]
fn pin_worker_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            log::warn!("failed to pin worker thread to core {}", core_id);
        }
    }
}

thread_local! {
    static CURRENT_SCHEDULER: RefCell<Option<Scheduler>> = RefCell::new(None);
    static CURRENT_WORKER: Cell<Option<WorkerId>> = Cell::new(None);
}

pub(crate) fn bind_current(scheduler: Scheduler, worker: WorkerId) {
    CURRENT_SCHEDULER.with(|c| *c.borrow_mut() = Some(scheduler));
    CURRENT_WORKER.with(|c| c.set(Some(worker)));
}

pub(crate) fn clear_current() {
    CURRENT_SCHEDULER.with(|c| *c.borrow_mut() = None);
    CURRENT_WORKER.with(|c| c.set(None));
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) thread_count: usize,
    pub(crate) hooks: Arc<dyn SchedulerHooks>,
    pub(crate) queue: Mutex<VecDeque<Task>>,
    pub(crate) started: AtomicBool,
    pub(crate) stopping: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) active_workers: AtomicUsize,
    pub(crate) idle_workers: AtomicUsize,
    pub(crate) running_workers: AtomicUsize,
    workers: Mutex<Vec<WorkerHandle>>,
    root_fiber: Mutex<Option<Fiber>>,
    lifecycle_lock: Mutex<()>,
    worker_stats: Vec<Arc<WorkerState>>,
}

impl Shared {
    fn enqueue(&self, tasks: Vec<Task>) -> Result<()> {
        for task in &tasks {
            if let Some(WorkerId(w)) = task.affinity {
                if w >= self.thread_count {
                    return Err(Error::InvalidAffinity {
                        worker: w,
                        pool: self.thread_count,
                    });
                }
            }
        }
        if tasks.is_empty() {
            return Ok(());
        }

        let was_empty;
        {
            let mut queue = self.queue.lock();
            // Checked under the queue lock: workers decide to exit under the
            // same lock, so a submission that gets in is guaranteed a drain.
            if self.stopping.load(Ordering::Acquire) {
                return Err(Error::Stopping);
            }
            was_empty = queue.is_empty();
            queue.extend(tasks);
        }
        // One wake per empty-to-non-empty transition, whole batch included.
        if was_empty {
            self.hooks.tickle();
        }
        Ok(())
    }

    /// Put a suspended fiber back at the tail. Allowed during drain; stop()
    /// must finish in-flight fibers, not strand them.
    pub(crate) fn requeue(&self, task: Task) {
        let was_empty;
        {
            let mut queue = self.queue.lock();
            was_empty = queue.is_empty();
            queue.push_back(task);
        }
        if was_empty {
            self.hooks.tickle();
        }
    }
}

/// Handle to a scheduler. Cheap to clone; all clones drive the same pool.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler with the default hooks.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_hooks(config, Arc::new(DefaultHooks))
    }

    /// Create a scheduler with injected hooks.
    pub fn with_hooks(config: Config, hooks: Arc<dyn SchedulerHooks>) -> Result<Self> {
        config.validate()?;
        let thread_count = config.worker_count();
        let worker_stats = (0..thread_count).map(|_| Arc::new(WorkerState::new())).collect();

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                thread_count,
                hooks,
                queue: Mutex::new(VecDeque::new()),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                active_workers: AtomicUsize::new(0),
                idle_workers: AtomicUsize::new(0),
                running_workers: AtomicUsize::new(0),
                workers: Mutex::new(Vec::new()),
                root_fiber: Mutex::new(None),
                lifecycle_lock: Mutex::new(()),
                worker_stats,
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// The scheduler owning the current worker thread, if any.
    ///
    /// Inside a task this returns a handle to the pool running it, so tasks
    /// can submit follow-up work.
    pub fn current() -> Option<Scheduler> {
        CURRENT_SCHEDULER.with(|c| c.borrow().clone())
    }

    /// Identity of the worker running the current thread, if any.
    pub fn current_worker() -> Option<WorkerId> {
        CURRENT_WORKER.with(|c| c.get())
    }

    /// The scheduler's name
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Size of the pool, caller slot included
    pub fn worker_threads(&self) -> usize {
        self.shared.thread_count
    }

    /// True between a successful `start()` and the first `stop()`
    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && !self.shared.stopping.load(Ordering::Acquire)
    }

    /// Number of tasks waiting in the queue
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Number of workers currently executing a task
    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::Acquire)
    }

    /// Number of workers currently parked waiting for work
    pub fn idle_workers(&self) -> usize {
        self.shared.idle_workers.load(Ordering::Acquire)
    }

    /// Total tasks run to completion across all workers
    pub fn tasks_executed(&self) -> u64 {
        self.shared
            .worker_stats
            .iter()
            .map(|s| s.tasks_executed.load(Ordering::Relaxed))
            .sum()
    }

    /// Enqueue one task.
    ///
    /// Fails with [`Error::Stopping`] once `stop()` has been invoked, and
    /// with [`Error::InvalidAffinity`] if the task is pinned to a worker
    /// outside the pool.
    pub fn submit(&self, task: Task) -> Result<()> {
        self.shared.enqueue(vec![task])
    }

    /// Enqueue one task pinned to a specific worker.
    pub fn submit_to(&self, task: Task, worker: WorkerId) -> Result<()> {
        self.shared.enqueue(vec![task.with_affinity(worker)])
    }

    /// Enqueue a batch of tasks, waking workers at most once.
    pub fn submit_many<I>(&self, tasks: I) -> Result<()>
    where
        I: IntoIterator<Item = Task>,
    {
        self.shared.enqueue(tasks.into_iter().collect())
    }

    /// Convenience wrapper: submit a plain callback.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::call(f))
    }

    /// Launch the worker pool. Idempotent while running.
    ///
    /// With `use_caller` the constructing thread cedes its stack to the
    /// run-loop through a dedicated root fiber; any tasks already queued are
    /// executed inline before this returns.
    pub fn start(&self) -> Result<()> {
        // Serialized against stop(): a stop() racing a start() must either
        // see no workers at all or the complete pool, root fiber included.
        let _guard = self.shared.lifecycle_lock.lock();
        if self.shared.stopping.load(Ordering::Acquire) {
            // A stopped scheduler does not restart.
            return Err(Error::Stopping);
        }
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let shared = &self.shared;
        let first = usize::from(shared.config.use_caller);
        {
            let mut workers = shared.workers.lock();
            for id in first..shared.thread_count {
                let worker = Worker::new(
                    WorkerId(id),
                    shared.clone(),
                    false,
                    shared.worker_stats[id].clone(),
                );
                let mut builder =
                    thread::Builder::new().name(format!("{}-{}", shared.config.name, id));
                if let Some(size) = shared.config.stack_size {
                    builder = builder.stack_size(size);
                }
                let pin_workers = shared.config.pin_workers;
                let thread = builder.spawn(move || {
                    #[cfg(target_os = "linux")]
                    if pin_workers {
                        pin_worker_to_core(id);
                    }
                    worker.run();
                })?;
                workers.push(WorkerHandle {
                    id: WorkerId(id),
                    thread: Some(thread),
                });
            }
        }

        if shared.config.use_caller {
            let worker = Worker::new(
                WorkerId(0),
                shared.clone(),
                true,
                shared.worker_stats[0].clone(),
            );
            let mut root = Fiber::new(shared.config.fiber_stack_size, move || worker.run());
            root.resume();
            *shared.root_fiber.lock() = Some(root);
        }
        Ok(())
    }

    /// Drain and shut down. Idempotent; blocks until every previously
    /// submitted task has run to completion and all workers have exited.
    ///
    /// Must not be called from inside a task: a task cannot join the pool
    /// that is running it. Such calls are logged and ignored.
    pub fn stop(&self) {
        if Fiber::current().is_some() {
            log::error!("{}: stop() called from inside a task; ignored", self.name());
            return;
        }

        let _guard = self.shared.lifecycle_lock.lock();
        if self.shared.stopped.load(Ordering::Acquire) {
            return;
        }
        self.shared.stopping.store(true, Ordering::Release);

        if !self.shared.started.load(Ordering::Acquire) {
            let dropped = self.shared.queue.lock().drain(..).count();
            if dropped > 0 {
                log::warn!(
                    "{}: stopped before start, dropping {} queued tasks",
                    self.name(),
                    dropped
                );
            }
            self.shared.stopped.store(true, Ordering::Release);
            return;
        }

        // Wake every possibly-idle worker so it observes the stop flag.
        for _ in 0..self.shared.thread_count {
            self.shared.hooks.tickle();
        }

        // Drain the caller's share first: a task pinned to worker 0 can only
        // ever run on this thread, so joining before this would deadlock.
        let root = self.shared.root_fiber.lock().take();
        if let Some(mut root) = root {
            while !root.is_finished() {
                root.resume();
                if !root.is_finished() {
                    thread::yield_now();
                }
            }
        }

        let mut workers = self.shared.workers.lock();
        for worker in workers.iter_mut() {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
        drop(workers);

        self.shared.stopped.store(true, Ordering::Release);
        log::debug!(
            "{}: stopped, {} tasks executed",
            self.name(),
            self.tasks_executed()
        );
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name())
            .field("worker_threads", &self.worker_threads())
            .field("pending_tasks", &self.pending_tasks())
            .field("running", &self.is_running())
            .finish()
    }
}
