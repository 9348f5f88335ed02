//! Concurrent bus configuration.

use std::time::Duration;

/// Configuration of a [`crate::ConcurrentEventBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Longest a dispatch worker waits on an empty queue before re-checking it
    /// (and its stop flag) without having been signalled.
    pub poll_interval: Duration,
    /// Worker threads are named `<prefix>-<EventType>`.
    pub thread_name_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            thread_name_prefix: "dispatch".to_string(),
        }
    }
}

impl BusConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}
