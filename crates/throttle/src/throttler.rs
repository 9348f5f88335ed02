//! Time-based throttling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use pulsegate_core::{Stoppable, SubscriptionId};
use pulsegate_events::{BusError, Consumer, Event, EventBus, consumer};
use pulsegate_stats::{SlidingWindowStatistics, Statistics};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ThrottlerConfig;
use crate::error::ThrottleError;
use crate::scheduler::{ScheduledTask, Scheduler};

/// Throttler decision, also published on the bus whenever it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThrottleResult {
    Proceed,
    DoNotProceed,
}

impl Event for ThrottleResult {}

/// Gate for a caller that must not exceed some rate.
pub trait Throttler {
    /// Current decision. Cheap; safe to call on every action.
    fn should_proceed(&self) -> ThrottleResult;

    /// Receive every subsequent change of decision.
    fn notify_when_can_proceed(
        &self,
        consumer: Consumer<ThrottleResult>,
    ) -> Result<SubscriptionId, BusError>;
}

struct ThrottleState<B> {
    hits: AtomicU32,
    proceed: AtomicBool,
    max_hits_per_interval: u32,
    bus: B,
}

impl<B: EventBus> ThrottleState<B> {
    /// Compare `hits` (a windowed mean or the running interval count) with the
    /// threshold and publish the new decision if it changed.
    fn evaluate(&self, hits: f64) {
        let proceed = hits < f64::from(self.max_hits_per_interval);
        if self.proceed.swap(proceed, Ordering::SeqCst) == proceed {
            return;
        }
        let result = to_result(proceed);
        info!(
            hits,
            max_hits_per_interval = self.max_hits_per_interval,
            result = ?result,
            "throttle state changed"
        );
        self.bus.publish(result);
    }
}

fn to_result(proceed: bool) -> ThrottleResult {
    if proceed {
        ThrottleResult::Proceed
    } else {
        ThrottleResult::DoNotProceed
    }
}

/// Throttler that keeps the mean number of hits per sampling interval, over a
/// sliding window of intervals, under `max_hits_per_interval`.
///
/// The window is pre-filled with the threshold itself, so a new throttler starts
/// at [`ThrottleResult::DoNotProceed`] and opens up once quiet intervals pull
/// the mean down. Within an interval, reaching the threshold closes the gate
/// straight away.
///
/// `B` is cloned between the statistics engine and the throttler; pass an
/// `Arc` of the bus.
pub struct TimeBasedThrottler<B: EventBus + Clone + 'static> {
    state: Arc<ThrottleState<B>>,
    statistics: Arc<SlidingWindowStatistics<B>>,
    sampler: ScheduledTask,
    statistics_subscription: SubscriptionId,
    config: ThrottlerConfig,
    stopped: AtomicBool,
}

impl<B: EventBus + Clone + 'static> TimeBasedThrottler<B> {
    pub fn new<S>(scheduler: &S, bus: B, config: ThrottlerConfig) -> Result<Self, ThrottleError>
    where
        S: Scheduler + ?Sized,
    {
        config.validate()?;
        let threshold = i32::try_from(config.max_hits_per_interval)
            .map_err(|_| ThrottleError::invalid_config("max_hits_per_interval too large"))?;

        let statistics = Arc::new(SlidingWindowStatistics::new(
            bus.clone(),
            config.num_samples,
        )?);
        let state = Arc::new(ThrottleState {
            hits: AtomicU32::new(0),
            proceed: AtomicBool::new(false),
            max_hits_per_interval: config.max_hits_per_interval,
            bus,
        });

        let statistics_subscription = {
            let state = state.clone();
            statistics.subscribe_for_statistics(consumer(move |stats: &Statistics| {
                state.evaluate(stats.mean());
                Ok(())
            }))?
        };

        let sample = {
            let state = state.clone();
            let statistics = statistics.clone();
            Box::new(move || {
                let hits = state.hits.swap(0, Ordering::SeqCst);
                statistics.add(i32::try_from(hits).unwrap_or(i32::MAX));
                debug!(hits, "hit sample added");
            })
        };
        let interval = config.sample_interval();
        let sampler =
            match scheduler.schedule_at_fixed_rate("throttle-sampler", interval, interval, sample) {
                Ok(task) => task,
                Err(err) => {
                    state.bus.unsubscribe(statistics_subscription);
                    return Err(err.into());
                }
            };

        statistics.fill_buffer(threshold);

        info!(
            max_hits_per_interval = config.max_hits_per_interval,
            num_samples = config.num_samples,
            sample_interval_ms = config.sample_interval_ms,
            "time-based throttler started"
        );

        Ok(Self {
            state,
            statistics,
            sampler,
            statistics_subscription,
            config,
            stopped: AtomicBool::new(false),
        })
    }

    /// Record one action. Closes the gate as soon as the current interval reaches
    /// the threshold.
    pub fn hit(&self) {
        let current = self.state.hits.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.state.evaluate(f64::from(current));
    }

    /// Hits recorded in the current interval so far.
    pub fn current_hits(&self) -> u32 {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn latest_statistics(&self) -> Option<Statistics> {
        self.statistics.latest_statistics()
    }

    pub fn config(&self) -> &ThrottlerConfig {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl<B: EventBus + Clone + 'static> Throttler for TimeBasedThrottler<B> {
    fn should_proceed(&self) -> ThrottleResult {
        to_result(self.state.proceed.load(Ordering::SeqCst))
    }

    fn notify_when_can_proceed(
        &self,
        consumer: Consumer<ThrottleResult>,
    ) -> Result<SubscriptionId, BusError> {
        self.state.bus.subscribe(consumer)
    }
}

impl<B: EventBus + Clone + 'static> Stoppable for TimeBasedThrottler<B> {
    /// Cancel sampling and detach from the statistics feed. The last decision is
    /// kept.
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sampler.cancel();
        self.state.bus.unsubscribe(self.statistics_subscription);
        info!(task_id = %self.sampler.id(), "time-based throttler stopped");
    }
}

impl<B: EventBus + Clone + 'static> Drop for TimeBasedThrottler<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
