//! Bus error model.

use thiserror::Error;

use pulsegate_core::SubscriptionId;

/// Errors surfaced to callers of the bus.
///
/// Faults raised by consumers are never surfaced: the bus logs and suppresses them
/// at the dispatch site.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The same (class, consumer, filter) triple is already registered.
    #[error("subscriber already registered to receive {class} events (as {existing})")]
    DuplicateSubscription {
        class: &'static str,
        existing: SubscriptionId,
    },
}

pub type BusResult<T> = Result<T, BusError>;
