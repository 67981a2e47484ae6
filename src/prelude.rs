pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::fiber::{yield_now, Fiber, FiberState};
pub use crate::scheduler::{
    DefaultHooks, ParkHooks, Scheduler, SchedulerHooks, Task, WorkerId,
};
