use pulsegate_events::BusError;
use pulsegate_stats::StatsError;
use thiserror::Error;

/// Errors raised when scheduling a task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task `{0}` has a zero period")]
    ZeroPeriod(String),

    #[error("scheduler is shut down")]
    ShutDown,

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors raised when building a throttler.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("invalid throttler config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Subscribe(#[from] BusError),

    #[error(transparent)]
    Schedule(#[from] SchedulerError),
}

impl ThrottleError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
