//! Subscriptions: a declared class, a consumer and an optional filter.

use core::fmt;
use std::any::{Any, TypeId};
use std::sync::Arc;

use pulsegate_core::SubscriptionId;

use crate::event::EventClass;

/// Outcome of a consumer call. An `Err` is logged by the bus and otherwise ignored.
pub type ConsumerResult = anyhow::Result<()>;

/// Side-effecting callback receiving events of class `T`.
///
/// Consumers are reference-counted so the same consumer can be recognised when it
/// is registered again (see [`crate::BusError::DuplicateSubscription`]).
pub type Consumer<T> = Arc<dyn Fn(&T) -> ConsumerResult + Send + Sync>;

/// Predicate selecting which events of class `T` reach a consumer.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Wrap a closure as a [`Consumer`].
///
/// Spelling the argument type once (`consumer(|n: &i32| ...)`) is usually enough
/// for inference.
pub fn consumer<T, F>(f: F) -> Consumer<T>
where
    T: ?Sized,
    F: Fn(&T) -> ConsumerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`Filter`].
pub fn filter<T, F>(f: F) -> Filter<T>
where
    T: ?Sized,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a subscription: the (class, consumer, filter) triple.
///
/// Consumers and filters are compared by allocation, the way two registrations of
/// the same closure value are recognised as equal. A missing filter (accept-all)
/// equals any other missing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionKey {
    class: TypeId,
    consumer: usize,
    filter: Option<usize>,
}

/// Type-erased subscription, as stored by the registry.
pub(crate) trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriptionId;

    fn class(&self) -> EventClass;

    fn key(&self) -> SubscriptionKey;

    /// Evaluate the filter against a view of the event as this subscription's class.
    fn accepts(&self, view: &(dyn Any + Send + Sync)) -> bool;

    fn consume(&self, view: &(dyn Any + Send + Sync)) -> ConsumerResult;
}

pub(crate) struct Subscription<T: ?Sized> {
    id: SubscriptionId,
    consumer: Consumer<T>,
    filter: Option<Filter<T>>,
}

impl<T> Subscription<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(consumer: Consumer<T>, filter: Option<Filter<T>>) -> Self {
        Self {
            id: SubscriptionId::new(),
            consumer,
            filter,
        }
    }

    fn view<'a>(&self, view: &'a (dyn Any + Send + Sync)) -> Option<&'a T> {
        view.downcast_ref::<Arc<T>>().map(|event| &**event)
    }
}

impl<T> Subscriber for Subscription<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn id(&self) -> SubscriptionId {
        self.id
    }

    fn class(&self) -> EventClass {
        EventClass::of::<T>()
    }

    fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            class: TypeId::of::<T>(),
            consumer: address(&self.consumer),
            filter: self.filter.as_ref().map(address),
        }
    }

    fn accepts(&self, view: &(dyn Any + Send + Sync)) -> bool {
        match (self.view(view), &self.filter) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(event), Some(filter)) => filter(event),
        }
    }

    fn consume(&self, view: &(dyn Any + Send + Sync)) -> ConsumerResult {
        let event = self.view(view).ok_or_else(|| {
            anyhow::anyhow!("event view does not match class {}", self.class())
        })?;
        (self.consumer)(event)
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("class", &EventClass::of::<T>())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

fn address<F: ?Sized>(shared: &Arc<F>) -> usize {
    Arc::as_ptr(shared).cast::<()>() as usize
}
