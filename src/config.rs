use crate::error::{Error, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of workers in the pool, counting the caller when `use_caller`
    /// is set. Defaults to the number of logical CPUs.
    pub worker_threads: Option<usize>,

    /// Let the constructing thread double as worker 0 instead of spawning an
    /// extra OS thread for that slot.
    pub use_caller: bool,

    /// Scheduler name, also used as the worker thread name prefix.
    pub name: String,

    /// Stack size for each fiber, in bytes.
    pub fiber_stack_size: usize,

    /// Stack size for spawned worker threads. `None` uses the OS default.
    pub stack_size: Option<usize>,

    /// Pin each spawned worker to a CPU core (Linux only).
    pub pin_workers: bool,

    /// Upper bound on how long a worker parks in the default idle hook
    /// before re-checking for work and the exit condition.
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: None,
            use_caller: false,
            name: "strand".to_string(),
            fiber_stack_size: 128 * 1024,
            stack_size: None,
            pin_workers: false,
            idle_timeout: Duration::from_millis(10),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.worker_threads {
            if n == 0 {
                if self.use_caller {
                    return Err(Error::config("worker_threads must be >= 1"));
                }
                return Err(Error::config(
                    "worker_threads is 0 and use_caller is off: no worker would ever run",
                ));
            }
            if n > 1024 {
                return Err(Error::config("worker_threads too large (max 1024)"));
            }
        }

        if self.fiber_stack_size < 4096 {
            return Err(Error::config("fiber_stack_size must be at least 4 KiB"));
        }

        if self.idle_timeout.is_zero() {
            return Err(Error::config("idle_timeout must be non-zero"));
        }

        Ok(())
    }

    /// Resolved pool size, caller slot included.
    pub fn worker_count(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = Some(n);
        self
    }

    pub fn use_caller(mut self, use_caller: bool) -> Self {
        self.config.use_caller = use_caller;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn fiber_stack_size(mut self, size: usize) -> Self {
        self.config.fiber_stack_size = size;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn pin_workers(mut self, pin: bool) -> Self {
        self.config.pin_workers = pin;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
