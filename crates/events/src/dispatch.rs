//! Delivery of a publication to its subscribers, with fault isolation.

use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, enabled, error, Level};

use crate::event::{EventClass, View};
use crate::subscription::Subscriber;

/// One subscriber's share of a publication: the subscriber and the event viewed
/// as the class it subscribed to.
pub(crate) struct Delivery {
    pub(crate) subscriber: Arc<dyn Subscriber>,
    pub(crate) view: View,
}

/// A published event together with the subscriptions that accepted it.
///
/// Filters have already run on the publisher's thread; delivering a publication
/// only invokes consumers.
pub(crate) struct Publication {
    class: EventClass,
    event: Arc<dyn fmt::Debug + Send + Sync>,
    deliveries: Vec<Delivery>,
}

impl Publication {
    pub(crate) fn new(
        class: EventClass,
        event: Arc<dyn fmt::Debug + Send + Sync>,
        deliveries: Vec<Delivery>,
    ) -> Self {
        Self {
            class,
            event,
            deliveries,
        }
    }

    pub(crate) fn class(&self) -> EventClass {
        self.class
    }

    pub(crate) fn event(&self) -> &(dyn fmt::Debug + Send + Sync) {
        &*self.event
    }

    /// Invoke every accepting consumer in order. Never fails and never panics.
    pub(crate) fn deliver(&self) {
        for delivery in &self.deliveries {
            deliver_one(self.event(), delivery);
        }
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("class", &self.class)
            .field("event", &self.event)
            .field("subscribers", &self.deliveries.len())
            .finish()
    }
}

/// Evaluate a subscriber's filter, treating a panicking filter as a rejection.
pub(crate) fn accepts(
    event: &(dyn fmt::Debug + Send + Sync),
    subscriber: &dyn Subscriber,
    view: &(dyn Any + Send + Sync),
) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| subscriber.accepts(view))) {
        Ok(accepted) => accepted,
        Err(payload) => {
            error!(
                event = ?event,
                subscription = %subscriber.id(),
                class = %subscriber.class(),
                panic = panic_message(payload.as_ref()),
                "subscriber filter panicked; event not delivered to it"
            );
            false
        }
    }
}

fn deliver_one(event: &(dyn fmt::Debug + Send + Sync), delivery: &Delivery) {
    let subscriber = &delivery.subscriber;
    let started = enabled!(Level::DEBUG).then(Instant::now);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        subscriber.consume(delivery.view.as_ref())
    }));

    match outcome {
        Ok(Ok(())) => {
            if let Some(started) = started {
                debug!(
                    event = ?event,
                    subscription = %subscriber.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "event dispatched"
                );
            }
        }
        Ok(Err(err)) => {
            error!(
                event = ?event,
                subscription = %subscriber.id(),
                class = %subscriber.class(),
                error = %err,
                "subscriber failed while consuming event"
            );
        }
        Err(payload) => {
            error!(
                event = ?event,
                subscription = %subscriber.id(),
                class = %subscriber.class(),
                panic = panic_message(payload.as_ref()),
                "subscriber panicked while consuming event"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
