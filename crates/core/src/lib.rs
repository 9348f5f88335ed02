//! `pulsegate-core` — primitives shared by the bus, statistics and throttling crates.
//!
//! This crate has no runtime behaviour of its own: identifiers, the lifecycle
//! contract for components owning background threads, and the error type for
//! parsing those identifiers.

pub mod error;
pub mod id;
pub mod lifecycle;

pub use error::{CoreError, CoreResult};
pub use id::{SubscriptionId, TaskId};
pub use lifecycle::Stoppable;
