//! Statistics error model.

use thiserror::Error;

pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// A window (or sample set) must hold at least one sample.
    #[error("a sliding window needs at least one sample")]
    EmptyWindow,

    /// The requested percentile maps to a rank outside `1..=samples`.
    #[error("percentile {percentile} maps to rank {rank}, outside 1..={samples}")]
    PercentileOutOfRange {
        percentile: u32,
        rank: usize,
        samples: usize,
    },
}
