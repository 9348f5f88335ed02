//! Throttler driven by a real fixed-rate scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pulsegate_core::Stoppable;
use pulsegate_events::{ConcurrentEventBus, SimpleEventBus, consumer};
use pulsegate_throttle::{
    FixedRateScheduler, ThrottleResult, Throttler, ThrottlerConfig, TimeBasedThrottler,
};

#[test]
fn caller_converges_to_the_allowed_rate() {
    pulsegate_observability::init();

    let scheduler = FixedRateScheduler::new();
    let config = ThrottlerConfig::default()
        .with_max_hits_per_interval(1)
        .with_num_samples(5)
        .with_sample_interval(Duration::from_millis(1000));
    let throttler =
        TimeBasedThrottler::new(&scheduler, Arc::new(SimpleEventBus::new()), config).unwrap();

    assert_eq!(throttler.should_proceed(), ThrottleResult::DoNotProceed);

    let end = Instant::now() + Duration::from_secs(5);
    let mut actions = 0;
    while Instant::now() <= end {
        if throttler.should_proceed() == ThrottleResult::Proceed {
            actions += 1;
            throttler.hit();
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert!((0..=10).contains(&actions), "performed {actions} actions");
    throttler.stop();
    scheduler.shutdown();
}

#[test]
fn notifications_gate_a_busy_worker() {
    let scheduler = FixedRateScheduler::new();
    let bus = Arc::new(ConcurrentEventBus::new());
    let config = ThrottlerConfig::default()
        .with_max_hits_per_interval(5)
        .with_num_samples(3)
        .with_sample_interval(Duration::from_millis(200));
    let throttler = Arc::new(TimeBasedThrottler::new(&scheduler, bus.clone(), config).unwrap());

    let running = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let actions = Arc::new(AtomicUsize::new(0));

    let gate = running.clone();
    throttler
        .notify_when_can_proceed(consumer(move |result: &ThrottleResult| {
            gate.store(*result == ThrottleResult::Proceed, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

    let performer = {
        let (throttler, running, done, actions) =
            (throttler.clone(), running.clone(), done.clone(), actions.clone());
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                if running.load(Ordering::SeqCst) {
                    actions.fetch_add(1, Ordering::SeqCst);
                    throttler.hit();
                }
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    thread::sleep(Duration::from_secs(2));
    done.store(true, Ordering::SeqCst);
    performer.join().unwrap();
    throttler.stop();
    bus.stop();

    // Unthrottled, the worker would act about once per millisecond.
    let performed = actions.load(Ordering::SeqCst);
    assert!((1..=200).contains(&performed), "performed {performed} actions");
}
