pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("scheduler is stopping or stopped")]
    Stopping,

    #[error("no worker {worker} in a pool of {pool}")]
    InvalidAffinity { worker: usize, pool: usize },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Error::Scheduler(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
