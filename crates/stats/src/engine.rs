//! Sliding-window statistics engine publishing on an event bus.

use std::sync::{PoisonError, RwLock};

use pulsegate_core::SubscriptionId;
use pulsegate_events::{BusResult, Consumer, EventBus};

use crate::error::StatsResult;
use crate::statistics::Statistics;
use crate::window::SlidingWindow;

/// Keeps the last N samples and publishes fresh [`Statistics`] for every sample
/// added once the window is full.
///
/// Statistics are delivered through the bus `B`: inline with a
/// [`pulsegate_events::SimpleEventBus`], on a worker thread with a
/// [`pulsegate_events::ConcurrentEventBus`].
pub struct SlidingWindowStatistics<B: EventBus> {
    window: SlidingWindow,
    latest: RwLock<Option<Statistics>>,
    bus: B,
}

impl<B: EventBus> SlidingWindowStatistics<B> {
    pub fn new(bus: B, num_samples: usize) -> StatsResult<Self> {
        Ok(Self {
            window: SlidingWindow::new(num_samples)?,
            latest: RwLock::new(None),
            bus,
        })
    }

    /// Add a measurement. Once the window is full this recomputes the statistics,
    /// stores them as the latest and publishes them.
    pub fn add(&self, measurement: i32) {
        let Some(samples) = self.window.push(measurement) else {
            return;
        };
        let Some(stats) = Statistics::summarize(samples) else {
            return;
        };

        tracing::trace!(
            measurement,
            mean = stats.mean(),
            min = stats.min(),
            max = stats.max(),
            "statistics recomputed"
        );

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(stats.clone());
        self.bus.publish(stats);
    }

    /// Add `value` once per slot, leaving a full window of identical samples.
    /// Each of these adds publishes like any other once the window is full.
    pub fn fill_buffer(&self, value: i32) {
        for _ in 0..self.window.capacity() {
            self.add(value);
        }
    }

    /// Subscribe `consumer` to the statistics published by this engine's bus.
    pub fn subscribe_for_statistics(
        &self,
        consumer: Consumer<Statistics>,
    ) -> BusResult<SubscriptionId> {
        self.bus.subscribe(consumer)
    }

    /// Statistics from the most recent full window, if any.
    pub fn latest_statistics(&self) -> Option<Statistics> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}
