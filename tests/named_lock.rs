// NamedLock / LockRegistry integration suite.
//
// Threads stand in for independent requests; each uses its own explicit
// ContextId so outcomes do not depend on thread identity.
// Invariants exercised:
// - Shared holders coexist; exclusive waits for every other holder.
// - A timed request returns false when the holder never releases, and
//   true promptly when it releases well before the deadline.
// - Holds are reentrant per context.
use record_store::{ContextId, LockConfig, LockMode, LockRegistry, ManualScheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn registry() -> Arc<LockRegistry> {
    Arc::new(LockRegistry::new(
        LockConfig::default(),
        Arc::new(ManualScheduler::new()),
    ))
}

const READER_1: ContextId = ContextId::new(1);
const READER_2: ContextId = ContextId::new(2);
const WRITER: ContextId = ContextId::new(3);

// Test: two shared holders, then an exclusive request.
// Verifies: the writer blocks while either reader holds, then succeeds.
#[test]
fn exclusive_waits_for_all_shared_holders() {
    let reg = registry();
    assert!(reg.lock("R", READER_1, LockMode::Shared, Duration::ZERO));
    assert!(reg.lock("r", READER_2, LockMode::Shared, Duration::ZERO));

    let granted = Arc::new(AtomicBool::new(false));
    let writer = {
        let reg = Arc::clone(&reg);
        let granted = Arc::clone(&granted);
        thread::spawn(move || {
            let ok = reg.lock("R", WRITER, LockMode::Exclusive, Duration::from_secs(10));
            granted.store(ok, Ordering::SeqCst);
            ok
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!granted.load(Ordering::SeqCst));
    reg.unlock("R", READER_1, LockMode::Shared);
    thread::sleep(Duration::from_millis(30));
    assert!(!granted.load(Ordering::SeqCst), "one reader still holds");
    reg.unlock("R", READER_2, LockMode::Shared);

    assert!(writer.join().unwrap());
    let lock = reg.get("R").unwrap();
    assert_eq!(lock.hold_count(WRITER, LockMode::Exclusive), 1);
    reg.unlock("R", WRITER, LockMode::Exclusive);
    assert!(lock.is_free());
}

// Test: shared holders on separate threads at the same time.
#[test]
fn shared_holders_overlap_across_threads() {
    let reg = registry();
    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = [READER_1, READER_2]
        .into_iter()
        .map(|ctx| {
            let reg = Arc::clone(&reg);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ok = reg.lock("shared", ctx, LockMode::Shared, Duration::from_secs(1));
                // Both must hold before either releases.
                barrier.wait();
                reg.unlock("shared", ctx, LockMode::Shared);
                ok
            })
        })
        .collect();
    for w in workers {
        assert!(w.join().unwrap());
    }
}

// Test: timeout when the exclusive holder never releases.
#[test]
fn times_out_against_unreleased_exclusive_holder() {
    let reg = registry();
    assert!(reg.lock("R", WRITER, LockMode::Exclusive, Duration::ZERO));
    for mode in [LockMode::Shared, LockMode::Exclusive] {
        let reg = Arc::clone(&reg);
        let res = thread::spawn(move || {
            let start = Instant::now();
            let ok = reg.lock("R", READER_1, mode, Duration::from_millis(50));
            (ok, start.elapsed())
        })
        .join()
        .unwrap();
        assert!(!res.0);
        assert!(res.1 >= Duration::from_millis(50));
    }
}

// Test: prompt grant when the holder releases well before the deadline.
#[test]
fn grants_promptly_after_release() {
    let reg = registry();
    assert!(reg.lock("R", WRITER, LockMode::Exclusive, Duration::ZERO));
    let waiter = {
        let reg = Arc::clone(&reg);
        thread::spawn(move || {
            let start = Instant::now();
            let ok = reg.lock("R", READER_1, LockMode::Shared, Duration::from_secs(10));
            (ok, start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(20));
    reg.unlock("R", WRITER, LockMode::Exclusive);
    let (ok, waited) = waiter.join().unwrap();
    assert!(ok);
    assert!(waited < Duration::from_secs(5), "waited {waited:?}");
}

// Test: reentrant holds and the RAII guard.
#[test]
fn reentrant_guards_release_in_any_order() {
    let reg = registry();
    let handle = reg.handle("accounts");
    let outer = handle
        .guard(WRITER, LockMode::Exclusive, Duration::ZERO)
        .unwrap();
    let inner = handle
        .guard(WRITER, LockMode::Exclusive, Duration::ZERO)
        .unwrap();
    assert_eq!(handle.hold_count(WRITER, LockMode::Exclusive), 2);
    assert!(handle.guard(READER_1, LockMode::Shared, Duration::ZERO).is_none());
    drop(outer);
    assert!(!handle.try_lock(READER_1, LockMode::Shared));
    drop(inner);
    assert!(handle.try_lock(READER_1, LockMode::Shared));
    handle.unlock(READER_1, LockMode::Shared);
    drop(handle);
    assert_eq!(reg.sweep(), 1);
}

// Test: the calling thread's context id works as an owner, too.
#[test]
fn thread_derived_context_ids() {
    let reg = registry();
    let me = ContextId::current();
    assert!(reg.lock("job", me, LockMode::Exclusive, Duration::ZERO));
    let other = {
        let reg = Arc::clone(&reg);
        thread::spawn(move || {
            reg.lock("job", ContextId::current(), LockMode::Shared, Duration::ZERO)
        })
        .join()
        .unwrap()
    };
    assert!(!other);
    assert!(reg.lock("job", me, LockMode::Shared, Duration::ZERO));
}
