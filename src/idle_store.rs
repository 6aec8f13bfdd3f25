//! IdleStore: a concurrent store that drops entries nobody has read for a
//! while.
//!
//! Each entry carries an idle flag, cleared by `put` and `get`. Every
//! sweep removes entries whose flag is still set and sets the flag on the
//! rest (second chance). With a sweep period `P`, an untouched entry lives
//! between `P` and `2P`. Sweeps are driven by the injected `Scheduler`, or
//! directly through `sweep()`.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::concurrent_store::ConcurrentStore;
use crate::config::{IdleConfig, StoreConfig};
use crate::scheduler::{Scheduler, TickListener, TimerId};
use crate::store::KeyValueStore;

/// Invoked with each evicted key and value, synchronously during a sweep.
pub type EvictionCallback<V> = Arc<dyn Fn(&str, V) + Send + Sync>;

struct Stamped<V> {
    value: V,
    idle: AtomicBool,
}

impl<V> Stamped<V> {
    fn fresh(value: V) -> Self {
        Self {
            value,
            idle: AtomicBool::new(false),
        }
    }
}

struct Inner<V> {
    values: ConcurrentStore<Stamped<V>>,
    callback: Mutex<Option<EvictionCallback<V>>>,
}

impl<V> Inner<V> {
    fn sweep(&self) -> usize {
        let callback = self.callback.lock().clone();
        let evicted = self.values.retain(
            // Keep entries touched since the last sweep, and mark them.
            |_, s| !s.idle.swap(true, Ordering::AcqRel),
            |key, s| {
                if let Some(cb) = &callback {
                    cb(&key, s.value);
                }
            },
        );
        debug!(evicted, remaining = self.values.len(), "idle sweep");
        evicted
    }
}

impl<V: Send + Sync> TickListener for Inner<V> {
    fn tick(&self) {
        self.sweep();
    }
}

pub struct IdleStore<V> {
    inner: Arc<Inner<V>>,
    scheduler: Arc<dyn Scheduler>,
    timer: TimerId,
    config: IdleConfig,
}

impl<V> IdleStore<V>
where
    V: Send + Sync + 'static,
{
    /// Creates the store and registers its sweep with `scheduler`.
    pub fn new(config: IdleConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let store_config = StoreConfig {
            case_sensitive: config.case_sensitive,
            ..StoreConfig::default()
        };
        let inner = Arc::new(Inner {
            values: ConcurrentStore::with_config(&store_config),
            callback: Mutex::new(None),
        });
        let listener: Weak<Inner<V>> = Arc::downgrade(&inner);
        let timer = scheduler.register(listener, config.sweep_period());
        debug!(
            timeout_seconds = config.timeout_seconds,
            period = ?config.sweep_period(),
            "created idle store"
        );
        Self {
            inner,
            scheduler,
            timer,
            config,
        }
    }

    pub fn with_callback(
        config: IdleConfig,
        scheduler: Arc<dyn Scheduler>,
        callback: impl Fn(&str, V) + Send + Sync + 'static,
    ) -> Self {
        let store = Self::new(config, scheduler);
        store.set_callback(callback);
        store
    }
}

impl<V> IdleStore<V> {
    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    /// Replace the eviction callback. Sweeps already running keep the
    /// callback they started with.
    pub fn set_callback(&self, callback: impl Fn(&str, V) + Send + Sync + 'static) {
        *self.inner.callback.lock() = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self.inner.callback.lock() = None;
    }

    /// Run one eviction pass now; returns how many entries were evicted.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.inner.values.is_case_sensitive()
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Insert or overwrite; the entry starts out not idle.
    pub fn put(&self, key: &str, value: V) -> Option<V> {
        self.inner
            .values
            .put(key, Stamped::fresh(value))
            .map(|s| s.value)
    }

    /// Read and mark the entry as recently used.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.inner.values.get_with(key, |s| {
            s.idle.store(false, Ordering::Release);
            s.value.clone()
        })
    }

    /// Read without touching the idle flag.
    pub fn peek(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.inner.values.get_with(key, |s| s.value.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.values.contains_key(key)
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut found = false;
        self.inner.values.for_each(|_, s| found |= s.value == *value);
        found
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.values.remove(key).map(|s| s.value)
    }

    pub fn clear(&self) {
        self.inner.values.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.values.keys()
    }

    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut out = Vec::new();
        self.inner.values.for_each(|_, s| out.push(s.value.clone()));
        out
    }

    pub fn put_if_absent(&self, key: &str, value: V) -> Option<V>
    where
        V: Clone,
    {
        let mut inserted = false;
        let current = self.inner.values.get_or_insert_with(
            key,
            || {
                inserted = true;
                Stamped::fresh(value)
            },
            |s| s.value.clone(),
        );
        (!inserted).then_some(current)
    }

    pub fn replace(&self, key: &str, value: V) -> Option<V> {
        self.inner
            .values
            .replace_when(key, |_| true, Stamped::fresh(value))
            .map(|s| s.value)
    }

    pub fn replace_if(&self, key: &str, expected: &V, value: V) -> bool
    where
        V: PartialEq,
    {
        self.inner
            .values
            .replace_when(key, |s| s.value == *expected, Stamped::fresh(value))
            .is_some()
    }

    pub fn remove_if(&self, key: &str, expected: &V) -> bool
    where
        V: PartialEq,
    {
        self.inner
            .values
            .remove_when(key, |s| s.value == *expected)
            .is_some()
    }
}

impl<V> Drop for IdleStore<V> {
    fn drop(&mut self) {
        self.scheduler.cancel(self.timer);
    }
}

impl<V> fmt::Debug for IdleStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleStore")
            .field("len", &self.len())
            .field("timeout_seconds", &self.config.timeout_seconds)
            .finish()
    }
}

impl<V> KeyValueStore<V> for IdleStore<V>
where
    V: Clone + PartialEq,
{
    fn is_case_sensitive(&self) -> bool {
        IdleStore::is_case_sensitive(self)
    }
    fn len(&self) -> usize {
        IdleStore::len(self)
    }
    fn get(&self, key: &str) -> Option<V> {
        IdleStore::get(self, key)
    }
    fn contains_key(&self, key: &str) -> bool {
        IdleStore::contains_key(self, key)
    }
    fn contains_value(&self, value: &V) -> bool {
        IdleStore::contains_value(self, value)
    }
    fn put(&self, key: &str, value: V) -> Option<V> {
        IdleStore::put(self, key, value)
    }
    fn remove(&self, key: &str) -> Option<V> {
        IdleStore::remove(self, key)
    }
    fn clear(&self) {
        IdleStore::clear(self)
    }
    fn put_if_absent(&self, key: &str, value: V) -> Option<V> {
        IdleStore::put_if_absent(self, key, value)
    }
    fn replace(&self, key: &str, value: V) -> Option<V> {
        IdleStore::replace(self, key, value)
    }
    fn replace_if(&self, key: &str, expected: &V, value: V) -> bool {
        IdleStore::replace_if(self, key, expected, value)
    }
    fn remove_if(&self, key: &str, expected: &V) -> bool {
        IdleStore::remove_if(self, key, expected)
    }
    fn keys(&self) -> Vec<String> {
        IdleStore::keys(self)
    }
    fn values(&self) -> Vec<V> {
        IdleStore::values(self)
    }
}
