//! Fixed-rate task scheduling.
//!
//! Each task scheduled on a [`FixedRateScheduler`] gets its own named thread. The
//! thread sleeps on a shutdown channel with `recv_timeout` until the next deadline,
//! so cancelling wakes it immediately.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use pulsegate_core::TaskId;
use tracing::{debug, error, info};

use crate::error::SchedulerError;

/// Repeating unit of work.
pub type Task = Box<dyn FnMut() + Send + 'static>;

/// Something that runs tasks at a fixed rate.
pub trait Scheduler: Send + Sync {
    /// Run `task` first after `initial_delay`, then every `period`, until the
    /// returned handle is cancelled.
    fn schedule_at_fixed_rate(
        &self,
        name: &str,
        initial_delay: Duration,
        period: Duration,
        task: Task,
    ) -> Result<ScheduledTask, SchedulerError>;
}

#[derive(Debug)]
struct TaskControl {
    cancelled: AtomicBool,
    wakeup: Option<mpsc::Sender<()>>,
}

/// Handle to a scheduled task. Clones share the same task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: TaskId,
    name: String,
    control: Arc<TaskControl>,
}

impl ScheduledTask {
    /// Handle for a task run by a custom [`Scheduler`], which should poll
    /// [`ScheduledTask::is_cancelled`] before every run.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_wakeup(name.into(), None)
    }

    fn with_wakeup(name: String, wakeup: Option<mpsc::Sender<()>>) -> Self {
        Self {
            id: TaskId::new(),
            name,
            control: Arc::new(TaskControl {
                cancelled: AtomicBool::new(false),
                wakeup,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop future runs. A run in progress completes. Idempotent.
    pub fn cancel(&self) {
        if self.control.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(wakeup) = &self.control.wakeup {
            let _ = wakeup.send(());
        }
        debug!(task_id = %self.id, task = %self.name, "scheduled task cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker threads are named `{prefix}-{task name}`.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// Thread-per-task fixed-rate scheduler.
///
/// Deadlines fall at `start + initial_delay + k * period`. After an overrun the
/// missed deadlines are skipped rather than run back to back.
#[derive(Debug, Default)]
pub struct FixedRateScheduler {
    config: SchedulerConfig,
    tasks: Mutex<Vec<ScheduledTask>>,
    shut_down: AtomicBool,
}

impl FixedRateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of scheduled tasks that have not been cancelled.
    pub fn active_tasks(&self) -> usize {
        self.tasks().iter().filter(|t| !t.is_cancelled()).count()
    }

    /// Cancel every task and reject further scheduling.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let tasks = std::mem::take(&mut *self.tasks());
        for task in &tasks {
            task.cancel();
        }
        info!(tasks = tasks.len(), "scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for FixedRateScheduler {
    fn schedule_at_fixed_rate(
        &self,
        name: &str,
        initial_delay: Duration,
        period: Duration,
        task: Task,
    ) -> Result<ScheduledTask, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod(name.to_string()));
        }

        let mut tasks = self.tasks();
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }

        let (wakeup_tx, wakeup_rx) = mpsc::channel::<()>();
        let handle = ScheduledTask::with_wakeup(name.to_string(), Some(wakeup_tx));
        let worker = handle.clone();
        let first_run = Instant::now() + initial_delay;

        thread::Builder::new()
            .name(format!("{}-{name}", self.config.thread_name_prefix))
            .spawn(move || run_loop(worker, wakeup_rx, first_run, period, task))?;

        info!(
            task_id = %handle.id(),
            task = name,
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "task scheduled"
        );

        tasks.retain(|t| !t.is_cancelled());
        tasks.push(handle.clone());
        Ok(handle)
    }
}

fn run_loop(
    handle: ScheduledTask,
    wakeup: mpsc::Receiver<()>,
    first_run: Instant,
    period: Duration,
    mut task: Task,
) {
    let mut deadline = first_run;
    let mut runs: u64 = 0;

    loop {
        match wakeup.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if handle.is_cancelled() {
            break;
        }

        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| task())) {
            error!(
                task_id = %handle.id(),
                task = handle.name(),
                panic = panic_message(panic.as_ref()),
                "scheduled task panicked"
            );
        }
        runs += 1;

        deadline += period;
        let now = Instant::now();
        if deadline <= now {
            let missed = (now - deadline).as_nanos() / period.as_nanos() + 1;
            deadline += period * u32::try_from(missed).unwrap_or(u32::MAX);
            debug!(task = handle.name(), missed = missed as u64, "task overran its period");
        }
    }

    debug!(task_id = %handle.id(), task = handle.name(), runs, "scheduler thread stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn runs_at_a_fixed_rate() {
        let scheduler = FixedRateScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = scheduler
            .schedule_at_fixed_rate(
                "tick",
                Duration::from_millis(50),
                Duration::from_millis(50),
                counting_task(&runs),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(25));
        assert_eq!(runs.load(Ordering::SeqCst), 0, "initial delay not honoured");

        thread::sleep(Duration::from_millis(500));
        task.cancel();
        let observed = runs.load(Ordering::SeqCst);
        assert!((7..=11).contains(&observed), "ran {observed} times");
    }

    #[test]
    fn cancel_stops_future_runs() {
        let scheduler = FixedRateScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let task = scheduler
            .schedule_at_fixed_rate(
                "cancel-me",
                Duration::ZERO,
                Duration::from_millis(10),
                counting_task(&runs),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(55));
        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());
        thread::sleep(Duration::from_millis(20));
        let after_cancel = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[test]
    fn panicking_task_keeps_its_schedule() {
        let scheduler = FixedRateScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = scheduler
            .schedule_at_fixed_rate(
                "flaky",
                Duration::ZERO,
                Duration::from_millis(10),
                Box::new(move || {
                    if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                        panic!("flaky task");
                    }
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(100));
        task.cancel();
        assert!(runs.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn shutdown_cancels_everything_and_rejects_new_tasks() {
        let scheduler = FixedRateScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let every_10ms = |name: &str| {
            scheduler.schedule_at_fixed_rate(
                name,
                Duration::ZERO,
                Duration::from_millis(10),
                counting_task(&runs),
            )
        };
        let first = every_10ms("a").unwrap();
        let second = every_10ms("b").unwrap();
        assert_eq!(scheduler.active_tasks(), 2);

        scheduler.shutdown();
        assert!(first.is_cancelled() && second.is_cancelled());
        assert!(matches!(every_10ms("c"), Err(SchedulerError::ShutDown)));
    }

    #[test]
    fn zero_period_is_rejected() {
        let scheduler = FixedRateScheduler::new();
        let result = scheduler.schedule_at_fixed_rate(
            "spin",
            Duration::ZERO,
            Duration::ZERO,
            Box::new(|| {}),
        );
        assert!(matches!(result, Err(SchedulerError::ZeroPeriod(name)) if name == "spin"));
    }

    #[test]
    fn worker_thread_is_named_after_the_task() {
        let config = SchedulerConfig::default().with_thread_name_prefix("test");
        let scheduler = FixedRateScheduler::with_config(config);
        let (tx, rx) = mpsc::channel();
        let task = scheduler
            .schedule_at_fixed_rate(
                "sampler",
                Duration::ZERO,
                Duration::from_millis(10),
                Box::new(move || {
                    let _ = tx.send(thread::current().name().map(str::to_owned));
                }),
            )
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        task.cancel();
        assert_eq!(name.as_deref(), Some("test-sampler"));
    }

    #[test]
    fn handles_for_custom_schedulers_start_active() {
        let task = ScheduledTask::new("manual");
        assert!(!task.is_cancelled());
        let clone = task.clone();
        clone.cancel();
        assert!(task.is_cancelled());
        assert_eq!(task.id(), clone.id());
    }
}
