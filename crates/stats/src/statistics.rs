//! Immutable statistics snapshot of a full window.

use chrono::{DateTime, Utc};
use pulsegate_events::Event;
use serde::Serialize;

use crate::error::{StatsError, StatsResult};

/// Descriptive statistics over one snapshot of samples.
///
/// Samples are kept sorted ascending so percentiles are a lookup. The value is
/// published on the bus as an event and is safe to share between threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    samples: Vec<i32>,
    mean: f64,
    mode: i32,
    min: i32,
    max: i32,
    computed_at: DateTime<Utc>,
}

impl Event for Statistics {}

impl Statistics {
    /// Compute statistics over `samples` (any order).
    pub fn compute(samples: impl Into<Vec<i32>>) -> StatsResult<Self> {
        Self::summarize(samples.into()).ok_or(StatsError::EmptyWindow)
    }

    pub(crate) fn summarize(mut samples: Vec<i32>) -> Option<Self> {
        samples.sort_unstable();
        let (&min, &max) = (samples.first()?, samples.last()?);

        let sum: i64 = samples.iter().map(|&v| i64::from(v)).sum();
        let mean = sum as f64 / samples.len() as f64;

        // Longest run in sorted order; ties go to the first (smallest) value.
        let mut mode = min;
        let mut best = 0usize;
        let mut run_start = 0usize;
        for i in 1..=samples.len() {
            if i == samples.len() || samples[i] != samples[run_start] {
                let run = i - run_start;
                if run > best {
                    best = run;
                    mode = samples[run_start];
                }
                run_start = i;
            }
        }

        Some(Self {
            samples,
            mean,
            mode,
            min,
            max,
            computed_at: Utc::now(),
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Most frequent sample; the smallest such value on ties.
    pub fn mode(&self) -> i32 {
        self.mode
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Sorted samples the statistics were computed from.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest-rank percentile: rank `floor(p / 100 * (N + 1))`, 1-based into the
    /// sorted samples.
    ///
    /// Returns [`StatsError::PercentileOutOfRange`] when the rank falls outside
    /// `1..=N` (e.g. `p = 0`, or a high percentile over very few samples).
    pub fn percentile(&self, percentile: u32) -> StatsResult<i32> {
        let samples = self.samples.len();
        let rank = (u64::from(percentile) * (samples as u64 + 1) / 100) as usize;
        if rank == 0 || rank > samples {
            return Err(StatsError::PercentileOutOfRange {
                percentile,
                rank,
                samples,
            });
        }
        Ok(self.samples[rank - 1])
    }
}
