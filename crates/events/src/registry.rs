//! Subscriber registry and resolved-subscribers cache.
//!
//! One mutex guards both the subscription list and the cache, so a publication
//! either resolves against the registry as it was before a `subscribe` or after
//! it, never in between. Every mutation clears the cache in full; entries are
//! rebuilt lazily on the next publication of each concrete class.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use pulsegate_core::SubscriptionId;

use crate::dispatch::{self, Delivery, Publication};
use crate::error::{BusError, BusResult};
use crate::event::{Event, EventClass, SharedEvent, Supertypes, Upcast};
use crate::subscription::{Consumer, Filter, Subscriber, Subscription, SubscriptionKey};

/// A subscription matched to a concrete class, with the conversion to the class
/// it subscribed to.
#[derive(Clone)]
pub(crate) struct Resolved {
    subscriber: Arc<dyn Subscriber>,
    upcast: Upcast,
}

#[derive(Default)]
struct RegistryState {
    /// Registration order; resolution preserves it.
    subscribers: Vec<Arc<dyn Subscriber>>,
    keys: HashSet<SubscriptionKey>,
    resolved: HashMap<TypeId, Arc<[Resolved]>>,
}

/// Thread-safe registry of subscriptions.
#[derive(Default)]
pub struct SubscriberRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` for events assignable to `T`, optionally filtered.
    ///
    /// Fails with [`BusError::DuplicateSubscription`] when the same triple is
    /// already registered; the registry is left untouched in that case.
    pub fn subscribe<T>(
        &self,
        consumer: Consumer<T>,
        filter: Option<Filter<T>>,
    ) -> BusResult<SubscriptionId>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let filtered = filter.is_some();
        let subscription = Subscription::new(consumer, filter);
        let id = subscription.id();
        let key = subscription.key();
        let class = subscription.class();

        {
            let mut state = self.lock();
            if !state.keys.insert(key) {
                let existing = state
                    .subscribers
                    .iter()
                    .find(|s| s.key() == key)
                    .map(|s| s.id())
                    .unwrap_or(id);
                return Err(BusError::DuplicateSubscription {
                    class: class.name(),
                    existing,
                });
            }
            state.subscribers.push(Arc::new(subscription));
            state.resolved.clear();
        }

        info!(subscription = %id, class = %class, filtered, "subscribed");
        Ok(id)
    }

    /// Remove a subscription. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut state = self.lock();
            match state.subscribers.iter().position(|s| s.id() == id) {
                Some(index) => {
                    let removed = state.subscribers.remove(index);
                    state.keys.remove(&removed.key());
                    state.resolved.clear();
                    Some(removed.class())
                }
                None => None,
            }
        };

        match removed {
            Some(class) => {
                info!(subscription = %id, class = %class, "unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the subscriptions that events of concrete class `E` resolve to, in
    /// delivery order. Filters are not evaluated.
    pub fn resolve<E: Event>(&self) -> Vec<SubscriptionId> {
        self.resolved::<E>()
            .iter()
            .map(|r| r.subscriber.id())
            .collect()
    }

    /// Number of concrete classes currently memoized.
    pub fn cached_classes(&self) -> usize {
        self.lock().resolved.len()
    }

    pub(crate) fn resolved<E: Event>(&self) -> Arc<[Resolved]> {
        let mut state = self.lock();
        if let Some(hit) = state.resolved.get(&TypeId::of::<E>()) {
            return Arc::clone(hit);
        }

        let types = Supertypes::<E>::collect();
        let matched: Arc<[Resolved]> = state
            .subscribers
            .iter()
            .filter_map(|subscriber| {
                types.upcast_to(subscriber.class()).map(|upcast| Resolved {
                    subscriber: Arc::clone(subscriber),
                    upcast: Arc::clone(upcast),
                })
            })
            .collect();

        debug!(
            class = %EventClass::of::<E>(),
            subscribers = matched.len(),
            "resolved subscribers"
        );
        state
            .resolved
            .insert(TypeId::of::<E>(), Arc::clone(&matched));
        matched
    }

    /// Resolve and filter `event` on the calling thread.
    ///
    /// Returns `None` when no subscription accepts the event, so callers can skip
    /// dispatch entirely.
    pub(crate) fn prepare<E: Event>(&self, event: E) -> Option<Publication> {
        let class = EventClass::of::<E>();
        let resolved = self.resolved::<E>();
        if resolved.is_empty() {
            trace!(event = ?event, class = %class, "no subscribers for event");
            return None;
        }

        let event = Arc::new(event);
        let shared: SharedEvent = event.clone();
        let deliveries: Vec<Delivery> = resolved
            .iter()
            .filter_map(|r| {
                let view = (r.upcast)(&shared)?;
                dispatch::accepts(&*event, r.subscriber.as_ref(), view.as_ref()).then(|| {
                    Delivery {
                        subscriber: Arc::clone(&r.subscriber),
                        view,
                    }
                })
            })
            .collect();

        if deliveries.is_empty() {
            trace!(event = ?event, class = %class, "event rejected by every filter");
            return None;
        }
        Some(Publication::new(class, event, deliveries))
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("SubscriberRegistry")
            .field("subscriptions", &state.subscribers.len())
            .field("cached_classes", &state.resolved.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{consumer, filter};
    use std::any::Any;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    #[derive(Debug)]
    struct User(String);

    impl Named for User {
        fn name(&self) -> &str {
            &self.0
        }
    }

    impl Event for User {
        fn supertypes(types: &mut Supertypes<Self>) {
            types.add::<dyn Named>(|user| user);
        }
    }

    #[test]
    fn duplicate_triple_is_rejected_and_registry_unchanged() {
        let registry = SubscriberRegistry::new();
        let c = consumer(|_: &i32| Ok(()));
        let first = registry.subscribe(c.clone(), None).unwrap();

        let err = registry.subscribe(c, None).unwrap_err();
        assert_eq!(
            err,
            BusError::DuplicateSubscription {
                class: "i32",
                existing: first
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_consumer_with_different_filter_is_a_new_subscription() {
        let registry = SubscriberRegistry::new();
        let c = consumer(|_: &i32| Ok(()));
        registry.subscribe(c.clone(), None).unwrap();
        registry
            .subscribe(c, Some(filter(|n: &i32| *n > 0)))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn resolution_follows_declared_supertypes_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let by_trait = registry
            .subscribe(consumer::<dyn Named, _>(|_| Ok(())), None)
            .unwrap();
        let unrelated = registry.subscribe(consumer(|_: &i32| Ok(())), None).unwrap();
        let by_root = registry
            .subscribe(consumer::<dyn Any + Send + Sync, _>(|_| Ok(())), None)
            .unwrap();
        let by_class = registry.subscribe(consumer(|_: &User| Ok(())), None).unwrap();

        assert_eq!(registry.resolve::<User>(), vec![by_trait, by_root, by_class]);
        assert_eq!(registry.resolve::<i32>(), vec![unrelated, by_root]);
    }

    #[test]
    fn cache_is_populated_lazily_and_cleared_on_mutation() {
        let registry = SubscriberRegistry::new();
        registry.subscribe(consumer(|_: &i32| Ok(())), None).unwrap();
        assert_eq!(registry.cached_classes(), 0);

        registry.resolve::<i32>();
        registry.resolve::<String>();
        assert_eq!(registry.cached_classes(), 2);

        let id = registry.subscribe(consumer(|_: &String| Ok(())), None).unwrap();
        assert_eq!(registry.cached_classes(), 0);
        assert_eq!(registry.resolve::<String>(), vec![id]);

        assert!(registry.unsubscribe(id));
        assert_eq!(registry.cached_classes(), 0);
        assert!(registry.resolve::<String>().is_empty());
        assert!(!registry.unsubscribe(id));
    }

    #[test]
    fn unsubscribed_consumer_can_register_again() {
        let registry = SubscriberRegistry::new();
        let c = consumer(|_: &i32| Ok(()));
        let id = registry.subscribe(c.clone(), None).unwrap();
        assert!(registry.unsubscribe(id));
        assert!(registry.subscribe(c, None).is_ok());
    }

    #[test]
    fn prepare_skips_events_nobody_accepts() {
        let registry = SubscriberRegistry::new();
        registry
            .subscribe(consumer(|_: &i32| Ok(())), Some(filter(|n: &i32| n % 2 == 0)))
            .unwrap();

        assert!(registry.prepare(3_i32).is_none());
        assert!(registry.prepare("text").is_none());
        assert!(registry.prepare(4_i32).is_some());
    }

    #[test]
    fn panicking_filter_rejects_without_unwinding_into_publisher() {
        let registry = SubscriberRegistry::new();
        registry
            .subscribe(
                consumer(|_: &i32| Ok(())),
                Some(filter(|_: &i32| panic!("broken filter"))),
            )
            .unwrap();
        assert!(registry.prepare(1_i32).is_none());
    }
}
