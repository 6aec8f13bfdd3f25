//! LockRegistry: named locks created on first use and retired when free.
//!
//! Names map to shared `NamedLock`s through a `ConcurrentStore`, folded
//! case-insensitively unless configured otherwise. A `LockHandle` pins its
//! lock with an external reference for as long as it lives. The periodic
//! sweep removes locks with neither holders nor references.
//!
//! Handle creation bumps the reference while the owning shard is write
//! locked, and the sweep checks `is_free` under that same shard lock, so a
//! lock can never be retired between lookup and pin.

use core::fmt;
use core::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use crate::concurrent_store::ConcurrentStore;
use crate::config::{LockConfig, StoreConfig};
use crate::named_lock::{ContextId, LockMode, NamedLock};
use crate::scheduler::{Scheduler, TickListener, TimerId};

struct Inner {
    locks: ConcurrentStore<Arc<NamedLock>>,
    config: LockConfig,
}

impl Inner {
    fn handle(&self, name: &str) -> LockHandle {
        let lock = self.locks.get_or_insert_with(
            name,
            || {
                debug!(lock = name, "created named lock");
                Arc::new(NamedLock::new(name, &self.config))
            },
            |lock| {
                lock.acquire_ref();
                Arc::clone(lock)
            },
        );
        LockHandle { lock }
    }

    fn sweep(&self) -> usize {
        let retired = self.locks.retain(
            |_, lock| !lock.is_free(),
            |name, _| {
                debug!(lock = %name, "retired named lock");
            },
        );
        if retired > 0 {
            debug!(retired, live = self.locks.len(), "lock sweep");
        }
        retired
    }
}

impl TickListener for Inner {
    fn tick(&self) {
        self.sweep();
    }
}

pub struct LockRegistry {
    inner: Arc<Inner>,
    scheduler: Arc<dyn Scheduler>,
    timer: TimerId,
}

impl LockRegistry {
    /// Creates the registry and registers its sweep with `scheduler`.
    pub fn new(config: LockConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let store_config = StoreConfig {
            case_sensitive: config.case_sensitive_names,
            ..StoreConfig::default()
        };
        let period = config.sweep_period();
        let inner = Arc::new(Inner {
            locks: ConcurrentStore::with_config(&store_config),
            config,
        });
        let listener: Weak<Inner> = Arc::downgrade(&inner);
        let timer = scheduler.register(listener, period);
        Self {
            inner,
            scheduler,
            timer,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// Pin the lock for `name`, creating it if needed.
    pub fn handle(&self, name: &str) -> LockHandle {
        self.inner.handle(name)
    }

    /// Acquire `name` for `ctx`; the lock stays registered while held.
    pub fn lock(&self, name: &str, ctx: ContextId, mode: LockMode, timeout: Duration) -> bool {
        self.handle(name).lock(ctx, mode, timeout)
    }

    /// Release one hold. Unknown names are ignored.
    pub fn unlock(&self, name: &str, ctx: ContextId, mode: LockMode) {
        if let Some(lock) = self.inner.locks.get(name) {
            lock.unlock(ctx, mode);
        }
    }

    /// The registered lock for `name`, without pinning or creating it.
    pub fn get(&self, name: &str) -> Option<Arc<NamedLock>> {
        self.inner.locks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.locks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.locks.is_empty()
    }

    /// Retire every free lock now; returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }
}

impl Drop for LockRegistry {
    fn drop(&mut self) {
        self.scheduler.cancel(self.timer);
    }
}

impl fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("locks", &self.len())
            .finish()
    }
}

/// A pinned `NamedLock`. Dereferences to the lock.
pub struct LockHandle {
    lock: Arc<NamedLock>,
}

impl Deref for LockHandle {
    type Target = NamedLock;

    fn deref(&self) -> &NamedLock {
        &self.lock
    }
}

impl Clone for LockHandle {
    fn clone(&self) -> Self {
        self.lock.acquire_ref();
        Self {
            lock: Arc::clone(&self.lock),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.lock.release_ref();
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockHandle").field(&self.lock.name()).finish()
    }
}
