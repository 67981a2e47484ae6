//! STRAND - Cooperative M:N fiber scheduling
//!
//! An in-process scheduler that multiplexes many lightweight cooperative
//! fibers onto a small pool of OS worker threads. Callers get a
//! queue-and-run model instead of raw thread management; this is the
//! runtime core that async I/O layers (reactors, timers, protocol stacks)
//! are built on top of.
//!
//! # Quick Start
//!
//! ```no_run
//! use strand::prelude::*;
//!
//! let scheduler = Scheduler::new(Config::builder().worker_threads(4).build()?)?;
//!
//! scheduler.execute(|| {
//!     println!("hello from a fiber");
//!     strand::yield_now(); // give another task a turn
//!     println!("and we're back");
//! })?;
//!
//! scheduler.start()?;
//! scheduler.stop();
//! # Ok::<(), strand::Error>(())
//! ```
//!
//! # Features
//!
//! - **Cooperative fibers**: tasks run until they yield or finish, never
//!   preempted mid-execution
//! - **Thread affinity**: pin a task to one specific worker
//! - **Caller as worker**: the constructing thread can double as a worker
//!   through an inline root fiber instead of an extra OS thread
//! - **Swappable hooks**: idle/wake/shutdown behavior injected via
//!   [`SchedulerHooks`], no subclassing
//! - **Graceful drain**: `stop()` finishes every submitted task before
//!   tearing the pool down

// Lint configuration
#![warn(missing_docs, missing_debug_implementations)]
#![allow(dead_code)] // During development

pub mod config;
pub mod error;
pub mod fiber;
pub mod prelude;
pub mod scheduler;
pub mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use fiber::{yield_now, Fiber, FiberId, FiberState};
pub use scheduler::{Scheduler, SchedulerHooks, Task, TaskId, WorkerId};
