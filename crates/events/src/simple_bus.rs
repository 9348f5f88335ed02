//! Synchronous bus: consumers run on the publisher's thread.

use pulsegate_core::SubscriptionId;
use tracing::trace;

use crate::bus::EventBus;
use crate::error::BusResult;
use crate::event::Event;
use crate::registry::SubscriberRegistry;
use crate::subscription::{Consumer, Filter};

/// In-process bus notifying subscribers on the thread calling `publish`.
///
/// - Subscriptions may be added concurrently, from any thread.
/// - `publish` returns once every accepting consumer has run.
/// - `publish_coalesce` is plain `publish`: nothing is ever queued, so there is
///   nothing to coalesce.
#[derive(Debug, Default)]
pub struct SimpleEventBus {
    registry: SubscriberRegistry,
}

impl SimpleEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }
}

impl EventBus for SimpleEventBus {
    fn publish<E: Event>(&self, event: E) {
        trace!(event = ?event, "publishing event");
        if let Some(publication) = self.registry.prepare(event) {
            publication.deliver();
        }
    }

    fn subscribe<T>(&self, consumer: Consumer<T>) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registry.subscribe(consumer, None)
    }

    fn subscribe_filtered<T>(
        &self,
        consumer: Consumer<T>,
        filter: Filter<T>,
    ) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registry.subscribe(consumer, Some(filter))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Supertypes;
    use crate::subscription::{consumer, filter};
    use crate::BusError;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Arc, Mutex};

    trait Message: Send + Sync {
        fn value(&self) -> i32;
    }

    #[derive(Debug)]
    struct Ping(i32);

    impl Message for Ping {
        fn value(&self) -> i32 {
            self.0
        }
    }

    impl Event for Ping {
        fn supertypes(types: &mut Supertypes<Self>) {
            types.add::<dyn Message>(|ping| ping);
        }
    }

    fn recorder<T: Copy + Send + Sync + 'static>() -> (Arc<Mutex<Vec<T>>>, Consumer<T>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        let c = consumer(move |v: &T| {
            sink.lock().unwrap().push(*v);
            Ok(())
        });
        (values, c)
    }

    #[test]
    fn interface_subscription_receives_implementing_events() {
        let bus = SimpleEventBus::new();
        let seen = Arc::new(AtomicI32::new(0));
        let sink = seen.clone();
        bus.subscribe(consumer::<dyn Message, _>(move |m| {
            sink.store(m.value(), Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

        bus.publish(Ping(36));
        assert_eq!(seen.load(Ordering::SeqCst), 36);
    }

    #[test]
    fn double_subscription_fails() {
        let bus = SimpleEventBus::new();
        let c = consumer(|_: &i32| Ok(()));
        bus.subscribe(c.clone()).unwrap();
        assert!(matches!(
            bus.subscribe(c),
            Err(BusError::DuplicateSubscription { .. })
        ));
    }

    #[test]
    fn event_reaches_later_subscriber_after_failing_one() {
        let bus = SimpleEventBus::new();
        let (values, ok) = recorder::<i32>();
        bus.subscribe(consumer(|_: &i32| anyhow::bail!("some bug in this consumer")))
            .unwrap();
        bus.subscribe(ok).unwrap();

        bus.publish(3_i32);
        assert_eq!(*values.lock().unwrap(), vec![3]);
    }

    #[test]
    fn event_reaches_earlier_subscriber_before_panicking_one() {
        let bus = SimpleEventBus::new();
        let (values, ok) = recorder::<i32>();
        bus.subscribe(ok).unwrap();
        bus.subscribe(consumer(|_: &i32| -> crate::ConsumerResult {
            panic!("some bug in this consumer")
        }))
        .unwrap();

        bus.publish(3_i32);
        bus.publish(4_i32);
        assert_eq!(*values.lock().unwrap(), vec![3, 4]);
    }

    #[test]
    fn coalescing_publish_delivers_every_event() {
        let bus = SimpleEventBus::new();
        let (values, c) = recorder::<i32>();
        bus.subscribe(c).unwrap();

        for n in 3..=6 {
            bus.publish_coalesce(n);
        }
        assert_eq!(*values.lock().unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn filter_selects_events() {
        let bus = SimpleEventBus::new();
        let (values, c) = recorder::<i32>();
        bus.subscribe_filtered(c, filter(|n: &i32| n % 2 == 0)).unwrap();

        bus.publish(3_i32);
        assert!(values.lock().unwrap().is_empty());

        bus.publish(4_i32);
        assert_eq!(*values.lock().unwrap(), vec![4]);
    }

    #[test]
    fn unsubscribed_consumer_stops_receiving() {
        let bus = SimpleEventBus::new();
        let (values, c) = recorder::<i32>();
        let id = bus.subscribe(c).unwrap();

        bus.publish(1_i32);
        assert!(bus.unsubscribe(id));
        bus.publish(2_i32);
        assert_eq!(*values.lock().unwrap(), vec![1]);
    }

    #[test]
    fn consumer_may_publish_and_subscribe_reentrantly() {
        let bus = Arc::new(SimpleEventBus::new());
        let (strings, record) = recorder::<&'static str>();

        let inner = bus.clone();
        bus.subscribe(consumer(move |n: &i32| {
            if *n == 1 {
                inner.subscribe(record.clone())?;
            }
            inner.publish("nested");
            Ok(())
        }))
        .unwrap();

        bus.publish(1_i32);
        bus.publish(2_i32);
        assert_eq!(*strings.lock().unwrap(), vec!["nested", "nested"]);
    }
}
