//! Stackful cooperative fibers.
//!
//! A [`Fiber`] owns its own call stack and runs until the wrapped callback
//! either finishes or suspends itself with [`yield_now`]. Resuming a suspended
//! fiber continues exactly where it left off, possibly on a different OS
//! thread; a fiber's stack is only ever touched by the thread currently
//! resuming it.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use generator::Gn;

/// Global fiber ID counter
static FIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(u64);

impl FiberId {
    fn next() -> Self {
        FiberId(FIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for diagnostics
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Execution state of a fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FiberState {
    /// Created, never resumed
    Ready = 0,
    /// Currently executing on some thread
    Running = 1,
    /// Yielded voluntarily, can be resumed again
    Suspended = 2,
    /// Callback returned normally
    Done = 3,
    /// Callback panicked; the panic was captured and will not propagate
    Faulted = 4,
}

impl FiberState {
    fn from_u8(v: u8) -> FiberState {
        match v {
            0 => FiberState::Ready,
            1 => FiberState::Running,
            2 => FiberState::Suspended,
            3 => FiberState::Done,
            _ => FiberState::Faulted,
        }
    }
}

/// State cell shared between the fiber handle and the trampoline running on
/// the fiber's own stack.
struct FiberShared {
    state: AtomicU8,
}

impl FiberShared {
    fn set(&self, state: FiberState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> FiberState {
        FiberState::from_u8(self.state.load(Ordering::Acquire))
    }
}

thread_local! {
    static CURRENT_FIBER: Cell<Option<FiberId>> = Cell::new(None);
}

/// A cooperative, stack-switching execution unit.
pub struct Fiber {
    id: FiberId,
    shared: Arc<FiberShared>,
    gen: generator::Generator<'static, (), ()>,
}

// Safety: a fiber is resumed by at most one thread at a time, and its stack
// is only ever touched by the thread currently resuming it. The callback
// itself is required to be Send.
unsafe impl Send for Fiber {}

impl Fiber {
    /// Create a fiber from a callback, allocating `stack_size` bytes of stack.
    ///
    /// The callback does not run until the first [`resume`](Self::resume).
    pub fn new<F>(stack_size: usize, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(FiberShared {
            state: AtomicU8::new(FiberState::Ready as u8),
        });
        let trampoline = shared.clone();
        let id = FiberId::next();

        let gen = Gn::<()>::new_opt(stack_size, move || {
            match catch_unwind(AssertUnwindSafe(f)) {
                Ok(()) => trampoline.set(FiberState::Done),
                Err(payload) => {
                    if payload.downcast_ref::<generator::Error>().is_some() {
                        // Stack teardown from a cancelled generator, not a
                        // user panic. Hand it back to the runtime.
                        std::panic::resume_unwind(payload);
                    }
                    log::error!("fiber {} panicked: {}", id.as_u64(), panic_message(&payload));
                    trampoline.set(FiberState::Faulted);
                }
            }
        });

        Self { id, shared, gen }
    }

    /// The fiber's unique ID
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Current execution state
    pub fn state(&self) -> FiberState {
        self.shared.get()
    }

    /// True when the fiber can be resumed
    pub fn is_resumable(&self) -> bool {
        matches!(self.state(), FiberState::Ready | FiberState::Suspended)
    }

    /// True once the fiber has reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self.state(), FiberState::Done | FiberState::Faulted)
    }

    /// Run the fiber until it yields or reaches a terminal state.
    ///
    /// Returns the state observed after the switch back. Resuming a finished
    /// fiber is a no-op.
    pub fn resume(&mut self) -> FiberState {
        if self.is_finished() {
            return self.state();
        }

        self.shared.set(FiberState::Running);
        let parent = CURRENT_FIBER.with(|c| c.replace(Some(self.id)));
        self.gen.resume();
        CURRENT_FIBER.with(|c| c.set(parent));

        if !self.gen.is_done() {
            // Terminal states are recorded by the trampoline itself.
            self.shared.set(FiberState::Suspended);
        }
        self.state()
    }

    /// ID of the fiber currently running on this thread, if any.
    pub fn current() -> Option<FiberId> {
        CURRENT_FIBER.with(|c| c.get())
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Suspend the current fiber, returning control to whoever resumed it.
///
/// Outside a fiber this degrades to an OS thread yield.
pub fn yield_now() {
    if Fiber::current().is_some() {
        generator::yield_with(());
    } else {
        std::thread::yield_now();
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
