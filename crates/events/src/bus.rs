//! Event publishing/subscription abstraction.
//!
//! An `EventBus` routes each published value to the subscriptions whose class the
//! value's concrete type is assignable to (see [`crate::event`]). Implementations
//! differ only in *where* consumers run:
//!
//! - [`crate::SimpleEventBus`] invokes consumers on the publisher's thread.
//! - [`crate::ConcurrentEventBus`] hands each publication to a worker thread
//!   dedicated to the event's concrete type.
//!
//! ## Delivery guarantees
//!
//! - A subscription registered strictly before a publication receives it (unless
//!   its filter rejects it or a later coalescing publication supersedes it).
//! - Within one event type, a subscription observes events in publication order.
//! - Nothing is guaranteed across event types.
//! - No persistence, no retries: a consumer fault is logged and the event is
//!   considered delivered.
//!
//! ## Fault isolation
//!
//! Consumers return [`crate::ConsumerResult`]. An `Err`, or a panic, is caught at the
//! dispatch site and logged with the event and subscription id. It never aborts the
//! publication, never reaches other subscribers and never unregisters the consumer.

use std::sync::Arc;

use pulsegate_core::SubscriptionId;

use crate::error::BusResult;
use crate::event::Event;
use crate::subscription::{Consumer, Filter};

/// Type-routed publish/subscribe bus.
///
/// The trait requires `Send + Sync`: buses are shared between publishing threads,
/// usually behind an `Arc` (for which the trait is implemented too).
pub trait EventBus: Send + Sync {
    /// Publish `event` to every subscription it is assignable to.
    fn publish<E: Event>(&self, event: E);

    /// Publish `event`, allowing the bus to drop events of the same type that are
    /// still waiting for dispatch. Buses without a queue treat this as `publish`.
    fn publish_coalesce<E: Event>(&self, event: E) {
        self.publish(event)
    }

    /// Receive every event assignable to `T`.
    fn subscribe<T>(&self, consumer: Consumer<T>) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static;

    /// Receive the events assignable to `T` for which `filter` holds.
    ///
    /// The filter runs on the publisher's thread.
    fn subscribe_filtered<T>(
        &self,
        consumer: Consumer<T>,
        filter: Filter<T>,
    ) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static;

    /// Remove a subscription. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus,
{
    fn publish<E: Event>(&self, event: E) {
        (**self).publish(event)
    }

    fn publish_coalesce<E: Event>(&self, event: E) {
        (**self).publish_coalesce(event)
    }

    fn subscribe<T>(&self, consumer: Consumer<T>) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        (**self).subscribe(consumer)
    }

    fn subscribe_filtered<T>(
        &self,
        consumer: Consumer<T>,
        filter: Filter<T>,
    ) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        (**self).subscribe_filtered(consumer, filter)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }
}
