//! `pulsegate-events` — type-routed event bus with coalescing dispatch.
//!
//! - [`SimpleEventBus`]: consumers run on the publishing thread.
//! - [`ConcurrentEventBus`]: one queue + worker thread per concrete event type,
//!   with optional coalescing of queued events.
//!
//! Routing is by the concrete type of the published value; see [`event`] for how
//! an event declares the classes (traits, parent types) it is also delivered as.

pub mod bus;
pub mod concurrent_bus;
pub mod config;
mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod registry;
pub mod simple_bus;
pub mod subscription;

pub use bus::EventBus;
pub use concurrent_bus::ConcurrentEventBus;
pub use config::BusConfig;
pub use dispatcher::DispatcherState;
pub use error::{BusError, BusResult};
pub use event::{Event, EventClass, Supertypes};
pub use registry::SubscriberRegistry;
pub use simple_bus::SimpleEventBus;
pub use subscription::{Consumer, ConsumerResult, Filter, consumer, filter};
