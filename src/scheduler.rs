//! Periodic tick sources for idle eviction and lock retirement.
//!
//! Stores never start timers of their own. They register a `TickListener`
//! with whatever `Scheduler` the runtime injects and cancel the
//! registration when dropped. Listeners are held weakly, so a store that
//! is gone simply stops being ticked and is pruned on the next pass.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::debug;

/// Receives periodic ticks.
pub trait TickListener: Send + Sync {
    fn tick(&self);
}

/// Identifies one registration for `Scheduler::cancel`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

pub trait Scheduler: Send + Sync {
    /// Tick `listener` every `period` until cancelled or dropped.
    fn register(&self, listener: Weak<dyn TickListener>, period: Duration) -> TimerId;

    /// Stop ticking a registration. Unknown ids are ignored.
    fn cancel(&self, id: TimerId);
}

struct Timer<T> {
    id: TimerId,
    listener: Weak<dyn TickListener>,
    period: Duration,
    due: T,
}

/// Deterministic scheduler driven by the caller's notion of time.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    now: Duration,
    timers: Vec<Timer<Duration>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation, as advanced by the caller.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of registrations still live.
    pub fn registrations(&self) -> usize {
        let mut state = self.state.lock();
        state.timers.retain(|t| t.listener.strong_count() > 0);
        state.timers.len()
    }

    /// Move time forward by `by`, ticking each listener once for every
    /// period that completes. Ticks run in due order, outside the lock.
    pub fn advance(&self, by: Duration) {
        let mut fired: Vec<(Duration, Arc<dyn TickListener>)> = Vec::new();
        {
            let mut state = self.state.lock();
            state.now += by;
            let now = state.now;
            state.timers.retain(|t| t.listener.strong_count() > 0);
            for timer in state.timers.iter_mut() {
                while timer.due <= now {
                    if let Some(listener) = timer.listener.upgrade() {
                        fired.push((timer.due, listener));
                    }
                    timer.due += timer.period;
                }
            }
        }
        fired.sort_by_key(|(due, _)| *due);
        for (_, listener) in fired {
            listener.tick();
        }
    }

    /// Tick every live listener once without moving time.
    pub fn tick_all(&self) {
        let live: Vec<Arc<dyn TickListener>> = {
            let mut state = self.state.lock();
            state.timers.retain(|t| t.listener.strong_count() > 0);
            state.timers.iter().filter_map(|t| t.listener.upgrade()).collect()
        };
        for listener in live {
            listener.tick();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn register(&self, listener: Weak<dyn TickListener>, period: Duration) -> TimerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due = state.now + period.max(Duration::from_nanos(1));
        state.timers.push(Timer {
            id,
            listener,
            period: period.max(Duration::from_nanos(1)),
            due,
        });
        debug!(?id, ?period, "registered manual timer");
        id
    }

    fn cancel(&self, id: TimerId) {
        self.state.lock().timers.retain(|t| t.id != id);
        debug!(?id, "cancelled manual timer");
    }
}

/// Scheduler backed by one background thread. The thread exits when the
/// scheduler is dropped.
pub struct ThreadScheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

struct Shared {
    state: Mutex<ThreadState>,
    wake: Condvar,
}

#[derive(Default)]
struct ThreadState {
    next_id: u64,
    shutdown: bool,
    timers: Vec<Timer<Instant>>,
}

impl ThreadScheduler {
    pub fn new() -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ThreadState::default()),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("record-store-ticks".into())
            .spawn(move || run(&worker_shared))?;
        let worker_id = worker.thread().id();
        Ok(Self {
            shared,
            worker: Some(worker),
            worker_id,
        })
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    while !state.shutdown {
        state.timers.retain(|t| t.listener.strong_count() > 0);
        let Some(next) = state.timers.iter().map(|t| t.due).min() else {
            shared.wake.wait(&mut state);
            continue;
        };
        let now = Instant::now();
        if next > now {
            shared.wake.wait_until(&mut state, next);
            continue;
        }
        let due = collect_due(&mut state, now);
        MutexGuard::unlocked(&mut state, || {
            for listener in due {
                listener.tick();
            }
        });
    }
    debug!("tick thread stopped");
}

fn collect_due(state: &mut ThreadState, now: Instant) -> Vec<Arc<dyn TickListener>> {
    let mut due = Vec::new();
    for timer in state.timers.iter_mut().filter(|t| t.due <= now) {
        if let Some(listener) = timer.listener.upgrade() {
            due.push(listener);
        }
        // Skip missed periods instead of ticking in a burst.
        timer.due = now + timer.period;
    }
    due
}

impl Scheduler for ThreadScheduler {
    fn register(&self, listener: Weak<dyn TickListener>, period: Duration) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        let mut state = self.shared.state.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        state.timers.push(Timer {
            id,
            listener,
            period,
            due: Instant::now() + period,
        });
        drop(state);
        self.shared.wake.notify_all();
        debug!(?id, ?period, "registered timer");
        id
    }

    fn cancel(&self, id: TimerId) {
        self.shared.state.lock().timers.retain(|t| t.id != id);
        self.shared.wake.notify_all();
        debug!(?id, "cancelled timer");
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wake.notify_all();
        // A listener may drop the last handle from the tick thread itself.
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
