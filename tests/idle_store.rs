// IdleStore integration suite, driven by both schedulers.
//
// Invariants exercised:
// - An entry read between two sweeps survives the second one.
// - An entry untouched for two sweep periods is evicted and handed to
//   the callback exactly once.
// - Dropping the store cancels its registration.
use parking_lot::Mutex;
use record_store::{IdleConfig, IdleStore, KeyValueStore, ManualScheduler, ThreadScheduler};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);

// Test: second-chance eviction over simulated minutes.
// Assumes: a 5 minute timeout sweeps every 5 minutes.
// Verifies: a key read every sweep stays, an untouched key leaves after
// the second sweep, and the callback sees it once.
#[test]
fn touched_entries_survive_untouched_are_evicted() {
    let scheduler = Arc::new(ManualScheduler::new());
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    let store = IdleStore::with_callback(IdleConfig::new(300), scheduler.clone(), move |k, v| {
        sink.lock().push((k.to_owned(), v));
    });
    assert_eq!(store.config().sweep_period(), 5 * MINUTE);

    store.put("session", 1);
    store.put("stale", 2);
    for _ in 0..4 {
        scheduler.advance(5 * MINUTE);
        assert_eq!(store.get("session"), Some(1));
    }
    assert!(!store.contains_key("stale"));
    assert_eq!(*evicted.lock(), [("stale".to_owned(), 2)]);
}

// Test: short timeouts round up to a one minute sweep.
#[test]
fn sub_minute_timeout_sweeps_every_minute() {
    let scheduler = Arc::new(ManualScheduler::new());
    let store: IdleStore<&str> = IdleStore::new(IdleConfig::new(10), scheduler.clone());
    store.put("k", "v");
    scheduler.advance(MINUTE);
    assert_eq!(store.len(), 1);
    scheduler.advance(MINUTE);
    assert!(store.is_empty());
}

// Test: case-insensitive variant folds keys.
#[test]
fn case_insensitive_idle_store() {
    let scheduler = Arc::new(ManualScheduler::new());
    let config = IdleConfig {
        case_sensitive: false,
        ..IdleConfig::default()
    };
    let store: IdleStore<i32> = IdleStore::new(config, scheduler);
    store.put("Key", 1);
    assert_eq!(store.get("KEY"), Some(1));
    store.put("key", 2);
    assert_eq!(KeyValueStore::len(&store), 1);
    assert!(!store.is_case_sensitive());
}

// Test: lifetime of the registration.
#[test]
fn dropping_the_store_cancels_its_sweep() {
    let scheduler = Arc::new(ManualScheduler::new());
    let a: IdleStore<i32> = IdleStore::new(IdleConfig::default(), scheduler.clone());
    let b: IdleStore<i32> = IdleStore::new(IdleConfig::default(), scheduler.clone());
    assert_eq!(scheduler.registrations(), 2);
    drop(a);
    assert_eq!(scheduler.registrations(), 1);
    drop(b);
    assert_eq!(scheduler.registrations(), 0);
}

/// A store whose sweep period is shorter than a minute, for real-time
/// scheduling tests only.
struct FastSweep(IdleStore<i32>);

impl record_store::TickListener for FastSweep {
    fn tick(&self) {
        self.0.sweep();
    }
}

// Test: ThreadScheduler drives sweeps on its own thread.
#[test]
fn thread_scheduler_drives_sweeps() {
    let ticks = Arc::new(ThreadScheduler::new().unwrap());
    let idle = Arc::new(ManualScheduler::new());
    let fast = Arc::new(FastSweep(IdleStore::new(IdleConfig::default(), idle)));
    fast.0.put("gone", 1);
    let listener: std::sync::Weak<dyn record_store::TickListener> = {
        let w: std::sync::Weak<FastSweep> = Arc::downgrade(&fast);
        w
    };
    record_store::Scheduler::register(&*ticks, listener, Duration::from_millis(5));
    let deadline = Instant::now() + Duration::from_secs(5);
    while !fast.0.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(fast.0.is_empty());
}
