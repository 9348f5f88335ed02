//! `pulsegate-stats` — descriptive statistics over a sliding window of samples.
//!
//! [`SlidingWindowStatistics`] keeps the last N `i32` samples and, once the
//! window is full, recomputes [`Statistics`] on every new sample and publishes
//! them on an event bus.

pub mod engine;
pub mod error;
pub mod statistics;
pub mod window;

pub use engine::SlidingWindowStatistics;
pub use error::{StatsError, StatsResult};
pub use statistics::Statistics;
pub use window::SlidingWindow;
