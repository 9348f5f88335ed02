//! Per-type dispatcher: a pending queue drained by a dedicated worker thread.
//!
//! ```text
//!            publish                 snapshot taken            batch delivered
//!   Idle ───────────────▶ Queued ─────────────────▶ Draining ─────────────────▶ Idle
//!     │                                                 │ (publishes may queue meanwhile)
//!     └──────────── stop() ──────────▶ Stopping ◀───────┘
//! ```
//!
//! Enqueue, coalescing and snapshotting all happen under the queue's mutex, so at
//! most one thread observes the queue going from non-empty to empty.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::dispatch::Publication;
use crate::event::EventClass;

/// Observable state of a per-type dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Queue empty, worker waiting.
    Idle,
    /// Publications waiting for the worker.
    Queued,
    /// Worker delivering a snapshot; new publications may accumulate.
    Draining,
    /// Stop requested; the worker exits at its next wait point.
    Stopping,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Publication>,
    draining: bool,
    stopped: bool,
}

/// Publications awaiting dispatch for one concrete event class.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    class: EventClass,
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl PendingQueue {
    pub(crate) fn new(class: EventClass) -> Self {
        Self {
            class,
            state: Mutex::new(QueueState::default()),
            signal: Condvar::new(),
        }
    }

    /// Append a publication and wake the worker. With `coalesce`, everything still
    /// queued is discarded first; a snapshot already being delivered is unaffected.
    pub(crate) fn push(&self, publication: Publication, coalesce: bool) {
        let mut state = self.lock();
        if state.stopped {
            debug!(
                class = %self.class,
                event = ?publication.event(),
                "dispatcher stopped; event dropped"
            );
            return;
        }

        let dropped = if coalesce {
            let dropped = state.pending.len();
            state.pending.clear();
            dropped
        } else {
            0
        };
        if dropped > 0 {
            debug!(class = %self.class, dropped, "coalescing: discarded queued events");
        }

        trace!(class = %self.class, event = ?publication.event(), "event queued for dispatch");
        state.pending.push_back(publication);
        debug!(class = %self.class, queued = state.pending.len(), "events queued");
        self.signal.notify_all();
    }

    pub(crate) fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        let lost = mem::take(&mut state.pending).len();
        if lost > 0 {
            debug!(class = %self.class, lost, "queued events discarded on stop");
        }
        self.signal.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn state(&self) -> DispatcherState {
        let state = self.lock();
        if state.stopped {
            DispatcherState::Stopping
        } else if state.draining {
            DispatcherState::Draining
        } else if state.pending.is_empty() {
            DispatcherState::Idle
        } else {
            DispatcherState::Queued
        }
    }

    /// Wait (at most `poll_interval`) for publications and take all of them.
    ///
    /// Returns `None` once the queue is stopped; an empty batch means the wait
    /// timed out or woke spuriously.
    fn next_batch(&self, poll_interval: Duration) -> Option<Vec<Publication>> {
        let mut state = self.lock();
        state.draining = false;
        if state.pending.is_empty() && !state.stopped {
            state = self
                .signal
                .wait_timeout(state, poll_interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        if state.stopped {
            return None;
        }

        let batch: Vec<Publication> = state.pending.drain(..).collect();
        state.draining = !batch.is_empty();
        Some(batch)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Start the worker draining `queue`.
pub(crate) fn spawn_worker(
    queue: Arc<PendingQueue>,
    thread_name: String,
    poll_interval: Duration,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || worker_loop(&thread_name, &queue, poll_interval))
}

fn worker_loop(name: &str, queue: &PendingQueue, poll_interval: Duration) {
    info!(worker = name, class = %queue.class, "dispatch worker started");

    while let Some(batch) = queue.next_batch(poll_interval) {
        if batch.is_empty() {
            trace!(worker = name, class = %queue.class, "no events to dispatch");
            continue;
        }

        debug!(
            worker = name,
            class = %queue.class,
            events = batch.len(),
            "dispatching events"
        );
        for publication in &batch {
            publication.deliver();
        }
    }

    debug!(worker = name, class = %queue.class, "dispatch worker interrupted, terminating");
}
