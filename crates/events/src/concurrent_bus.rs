//! Concurrent bus: one queue and one worker thread per concrete event type.
//!
//! Publishing resolves and filters on the caller's thread (exactly like
//! [`crate::SimpleEventBus`]) and then hands the publication to the dispatcher of
//! the event's concrete type, creating it on first use. Publishers never wait for
//! consumers; a slow consumer only delays later events of its own type.
//!
//! Each worker fans a publication out to every subscription that accepted it, so
//! several subscriptions on one type share the type's worker and all of them see
//! the type's events in publication order.
//!
//! Lock order is always dispatcher table, then queue; the table lock is released
//! before the queue lock is taken.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, trace};

use pulsegate_core::{Stoppable, SubscriptionId};

use crate::bus::EventBus;
use crate::config::BusConfig;
use crate::dispatcher::{self, DispatcherState, PendingQueue};
use crate::error::BusResult;
use crate::event::{Event, EventClass};
use crate::registry::SubscriberRegistry;
use crate::subscription::{Consumer, Filter};

#[derive(Debug)]
struct Dispatcher {
    class: EventClass,
    queue: Arc<PendingQueue>,
    worker: String,
}

/// Event bus dispatching asynchronously on per-type worker threads.
///
/// A thread per event type is cheap in practice: the set of event types stops
/// growing once an application reaches a steady state.
///
/// `stop()` (also run on drop) signals every worker and forgets the dispatchers;
/// events still queued are lost. Publishing afterwards simply creates new
/// dispatchers.
#[derive(Debug, Default)]
pub struct ConcurrentEventBus {
    registry: SubscriberRegistry,
    dispatchers: Mutex<HashMap<TypeId, Dispatcher>>,
    config: BusConfig,
}

impl ConcurrentEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            dispatchers: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Number of live per-type dispatchers.
    pub fn dispatcher_count(&self) -> usize {
        self.table().len()
    }

    /// Publications of concrete type `E` waiting for their worker.
    pub fn queued<E: Event>(&self) -> usize {
        self.queue_for(TypeId::of::<E>())
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// State of the dispatcher for concrete type `E`, if one exists.
    pub fn dispatcher_state<E: Event>(&self) -> Option<DispatcherState> {
        self.queue_for(TypeId::of::<E>()).map(|q| q.state())
    }

    fn publish_impl<E: Event>(&self, event: E, coalesce: bool) {
        trace!(event = ?event, coalesce, "publishing event");
        let Some(publication) = self.registry.prepare(event) else {
            return;
        };

        match self.dispatcher_for(publication.class()) {
            Some(queue) => queue.push(publication, coalesce),
            None => publication.deliver(),
        }
    }

    /// Get or create the dispatcher for `class`.
    ///
    /// Returns `None` if no worker thread could be spawned; the caller then
    /// delivers on its own thread rather than losing the event.
    fn dispatcher_for(&self, class: EventClass) -> Option<Arc<PendingQueue>> {
        let mut table = self.table();
        if let Some(existing) = table.get(&class.id()) {
            return Some(Arc::clone(&existing.queue));
        }

        let queue = Arc::new(PendingQueue::new(class));
        let worker = format!("{}-{}", self.config.thread_name_prefix, class.simple_name());
        match dispatcher::spawn_worker(queue.clone(), worker.clone(), self.config.poll_interval) {
            Ok(_detached) => {
                info!(class = %class, worker = %worker, "dispatcher created");
                table.insert(
                    class.id(),
                    Dispatcher {
                        class,
                        queue: Arc::clone(&queue),
                        worker,
                    },
                );
                Some(queue)
            }
            Err(err) => {
                error!(
                    class = %class,
                    error = %err,
                    "failed to spawn dispatch worker; delivering on publisher thread"
                );
                None
            }
        }
    }

    fn queue_for(&self, id: TypeId) -> Option<Arc<PendingQueue>> {
        self.table().get(&id).map(|d| Arc::clone(&d.queue))
    }

    fn table(&self) -> MutexGuard<'_, HashMap<TypeId, Dispatcher>> {
        self.dispatchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for ConcurrentEventBus {
    fn publish<E: Event>(&self, event: E) {
        self.publish_impl(event, false)
    }

    /// Queue `event`, discarding events of the same concrete type that are still
    /// waiting for the worker. The event the worker is delivering right now is
    /// not cancelled.
    fn publish_coalesce<E: Event>(&self, event: E) {
        self.publish_impl(event, true)
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

impl Stoppable for ConcurrentEventBus {
    fn stop(&self) {
        let stopped: Vec<Dispatcher> = self.table().drain().map(|(_, d)| d).collect();
        for dispatcher in &stopped {
            dispatcher.queue.stop();
            info!(
                class = %dispatcher.class,
                worker = %dispatcher.worker,
                "dispatcher stopped"
            );
        }
    }
}

impl Drop for ConcurrentEventBus {
    fn drop(&mut self) {
        self.stop();
    }
}
