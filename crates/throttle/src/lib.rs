//! `pulsegate-throttle` — time-based throttling on top of sliding-window statistics.
//!
//! A [`TimeBasedThrottler`] counts hits, samples the count once per interval into a
//! [`pulsegate_stats::SlidingWindowStatistics`] and answers PROCEED while the
//! windowed mean stays under the configured threshold. Sampling runs on a
//! [`Scheduler`]; [`FixedRateScheduler`] is the thread-backed default.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod throttler;

pub use config::ThrottlerConfig;
pub use error::{SchedulerError, ThrottleError};
pub use scheduler::{FixedRateScheduler, ScheduledTask, Scheduler, SchedulerConfig, Task};
pub use throttler::{ThrottleResult, Throttler, TimeBasedThrottler};
