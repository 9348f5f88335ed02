//! Throttler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ThrottleError;

/// Throttler settings.
///
/// Deserializable so it can live in a service's config file; missing fields take
/// their defaults:
///
/// ```json
/// { "max_hits_per_interval": 10, "num_samples": 5, "sample_interval_ms": 1000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlerConfig {
    /// Threshold M: PROCEED while the windowed mean of hits per interval is below it.
    pub max_hits_per_interval: u32,
    /// Number of interval samples in the window.
    pub num_samples: usize,
    /// Length of one sampling interval, in milliseconds.
    pub sample_interval_ms: u64,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            max_hits_per_interval: 10,
            num_samples: 5,
            sample_interval_ms: 1000,
        }
    }
}

impl ThrottlerConfig {
    pub fn with_max_hits_per_interval(mut self, max: u32) -> Self {
        self.max_hits_per_interval = max;
        self
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ThrottleError> {
        if self.max_hits_per_interval == 0 {
            return Err(ThrottleError::invalid_config(
                "max_hits_per_interval must be positive",
            ));
        }
        if i32::try_from(self.max_hits_per_interval).is_err() {
            return Err(ThrottleError::invalid_config(
                "max_hits_per_interval must fit in an i32 sample",
            ));
        }
        if self.num_samples == 0 {
            return Err(ThrottleError::invalid_config("num_samples must be positive"));
        }
        if self.sample_interval_ms == 0 {
            return Err(ThrottleError::invalid_config(
                "sample_interval_ms must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_json_with_defaults() {
        let config: ThrottlerConfig =
            serde_json::from_str(r#"{ "max_hits_per_interval": 3, "sample_interval_ms": 250 }"#)
                .unwrap();
        assert_eq!(config.max_hits_per_interval, 3);
        assert_eq!(config.num_samples, 5);
        assert_eq!(config.sample_interval(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_fields_are_rejected() {
        let zero_max = ThrottlerConfig::default().with_max_hits_per_interval(0);
        let zero_samples = ThrottlerConfig::default().with_num_samples(0);
        let zero_interval = ThrottlerConfig::default().with_sample_interval(Duration::ZERO);
        for config in [zero_max, zero_samples, zero_interval] {
            assert!(matches!(
                config.validate(),
                Err(ThrottleError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn threshold_must_fit_a_sample() {
        let config = ThrottlerConfig::default().with_max_hits_per_interval(u32::MAX);
        assert!(matches!(
            config.validate(),
            Err(ThrottleError::InvalidConfig(_))
        ));
    }
}
