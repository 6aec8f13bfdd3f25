//! ConcurrentStore: sharded, case-folding key/value table.
//!
//! Each shard is a `hashbrown::HashTable` behind a `parking_lot::RwLock`.
//! A slot keeps its precomputed hash so growing a shard never calls back
//! into the hasher. Single-key operations take exactly one shard lock and
//! are linearizable; bulk views visit shards one after another and are
//! only weakly consistent with concurrent writers.

use core::fmt;
use core::hash::BuildHasher;
use core::mem;
use hashbrown::hash_table::Entry;
use hashbrown::HashTable;
use parking_lot::RwLock;
use std::collections::hash_map::RandomState;

use crate::config::StoreConfig;
use crate::key::KeyNormalizer;
use crate::store::KeyValueStore;

struct Slot<V> {
    key: Box<str>,
    hash: u64,
    value: V,
}

type Shard<V> = RwLock<HashTable<Slot<V>>>;

pub struct ConcurrentStore<V, S = RandomState> {
    normalizer: KeyNormalizer,
    hasher: S,
    shards: Box<[Shard<V>]>,
    mask: usize,
}

impl<V> ConcurrentStore<V> {
    /// Case-sensitive store with default sharding.
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<V> Default for ConcurrentStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> ConcurrentStore<V, S>
where
    S: BuildHasher,
{
    pub fn with_config_and_hasher(config: &StoreConfig, hasher: S) -> Self {
        let count = config.shard_count();
        let per_shard = config.initial_capacity.div_ceil(count);
        let shards = (0..count)
            .map(|_| RwLock::new(HashTable::with_capacity(per_shard)))
            .collect();
        Self {
            normalizer: config.normalizer(),
            hasher,
            shards,
            mask: count - 1,
        }
    }

    pub fn normalizer(&self) -> KeyNormalizer {
        self.normalizer
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.normalizer.is_case_sensitive()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    #[inline]
    fn shard(&self, hash: u64) -> &Shard<V> {
        // High bits pick the shard; hashbrown probes with the low bits.
        &self.shards[(hash >> 48) as usize & self.mask]
    }

    /// Runs `f` on the value under the shard read lock. `f` must not call
    /// back into this store.
    pub fn get_with<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        let folded = self.normalizer.fold(key);
        let hash = self.hasher.hash_one(&*folded);
        let shard = self.shard(hash).read();
        shard
            .find(hash, |s| *s.key == *folded)
            .map(|s| f(&s.value))
    }

    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.get_with(key, V::clone)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_with(key, |_| ()).is_some()
    }

    /// Insert or overwrite, returning the previous value.
    pub fn put(&self, key: &str, value: V) -> Option<V> {
        let folded = self.normalizer.fold(key);
        let hash = self.hasher.hash_one(&*folded);
        let mut shard = self.shard(hash).write();
        match shard.entry(hash, |s| *s.key == *folded, |s| s.hash) {
            Entry::Occupied(mut o) => Some(mem::replace(&mut o.get_mut().value, value)),
            Entry::Vacant(v) => {
                v.insert(Slot {
                    key: folded.into_owned().into_boxed_str(),
                    hash,
                    value,
                });
                None
            }
        }
    }

    /// Looks the key up, inserting `make()` first when absent, and runs `f`
    /// on the stored value while the shard is still locked.
    pub fn get_or_insert_with<R>(
        &self,
        key: &str,
        make: impl FnOnce() -> V,
        f: impl FnOnce(&V) -> R,
    ) -> R {
        let folded = self.normalizer.fold(key);
        let hash = self.hasher.hash_one(&*folded);
        let mut shard = self.shard(hash).write();
        match shard.entry(hash, |s| *s.key == *folded, |s| s.hash) {
            Entry::Occupied(o) => f(&o.get().value),
            Entry::Vacant(v) => {
                let o = v.insert(Slot {
                    key: folded.into_owned().into_boxed_str(),
                    hash,
                    value: make(),
                });
                f(&o.get().value)
            }
        }
    }

    /// Insert only if absent; otherwise returns a copy of the current value.
    pub fn put_if_absent(&self, key: &str, value: V) -> Option<V>
    where
        V: Clone,
    {
        let mut inserted = false;
        let existing = self.get_or_insert_with(
            key,
            || {
                inserted = true;
                value
            },
            V::clone,
        );
        (!inserted).then_some(existing)
    }

    /// Overwrite only when the current value satisfies `pred`; returns the
    /// previous value when replaced.
    pub fn replace_when(&self, key: &str, pred: impl FnOnce(&V) -> bool, value: V) -> Option<V> {
        let folded = self.normalizer.fold(key);
        let hash = self.hasher.hash_one(&*folded);
        let mut shard = self.shard(hash).write();
        let slot = shard.find_mut(hash, |s| *s.key == *folded)?;
        if pred(&slot.value) {
            Some(mem::replace(&mut slot.value, value))
        } else {
            None
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.remove_when(key, |_| true)
    }

    /// Remove only when the current value satisfies `pred`.
    pub fn remove_when(&self, key: &str, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let folded = self.normalizer.fold(key);
        let hash = self.hasher.hash_one(&*folded);
        let mut shard = self.shard(hash).write();
        let entry = shard.find_entry(hash, |s| *s.key == *folded).ok()?;
        if !pred(&entry.get().value) {
            return None;
        }
        let (slot, _) = entry.remove();
        Some(slot.value)
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.shards
            .iter()
            .any(|shard| shard.read().iter().any(|s| s.value == *value))
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().clear();
        }
    }

    /// Visits every binding, one shard at a time. Keys are the folded keys.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V)) {
        for shard in self.shards.iter() {
            for s in shard.read().iter() {
                f(&s.key, &s.value);
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.for_each(|k, _| out.push(k.to_owned()));
        out
    }

    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut out = Vec::new();
        self.for_each(|_, v| out.push(v.clone()));
        out
    }

    /// Keeps bindings for which `keep` returns true. Removed bindings are
    /// handed to `on_removed` after the owning shard lock is released.
    pub fn retain(
        &self,
        mut keep: impl FnMut(&str, &mut V) -> bool,
        mut on_removed: impl FnMut(String, V),
    ) -> usize {
        let mut total = 0;
        for shard in self.shards.iter() {
            let removed = {
                let mut table = shard.write();
                let doomed: Vec<(u64, Box<str>)> = table
                    .iter_mut()
                    .filter_map(|s| {
                        if keep(&s.key, &mut s.value) {
                            None
                        } else {
                            Some((s.hash, s.key.clone()))
                        }
                    })
                    .collect();
                let mut removed = Vec::with_capacity(doomed.len());
                for (hash, key) in doomed {
                    if let Ok(entry) = table.find_entry(hash, |s| s.key == key) {
                        let (slot, _) = entry.remove();
                        removed.push(slot);
                    }
                }
                removed
            };
            total += removed.len();
            for slot in removed {
                on_removed(slot.key.into_string(), slot.value);
            }
        }
        total
    }
}

impl<V, S> Clone for ConcurrentStore<V, S>
where
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Snapshot with the same case mode and sharding. Values are cloned,
    /// which for reference-counted values shares them.
    fn clone(&self) -> Self {
        let shards = self
            .shards
            .iter()
            .map(|shard| {
                let table = shard.read();
                let mut copy = HashTable::with_capacity(table.len());
                for s in table.iter() {
                    copy.insert_unique(
                        s.hash,
                        Slot {
                            key: s.key.clone(),
                            hash: s.hash,
                            value: s.value.clone(),
                        },
                        |s: &Slot<V>| s.hash,
                    );
                }
                RwLock::new(copy)
            })
            .collect();
        Self {
            normalizer: self.normalizer,
            hasher: self.hasher.clone(),
            shards,
            mask: self.mask,
        }
    }
}

impl<V, S> fmt::Debug for ConcurrentStore<V, S>
where
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for shard in self.shards.iter() {
            for s in shard.read().iter() {
                m.entry(&s.key, &s.value);
            }
        }
        m.finish()
    }
}

impl<V, S> KeyValueStore<V> for ConcurrentStore<V, S>
where
    V: Clone + PartialEq,
    S: BuildHasher,
{
    fn is_case_sensitive(&self) -> bool {
        ConcurrentStore::is_case_sensitive(self)
    }
    fn len(&self) -> usize {
        ConcurrentStore::len(self)
    }
    fn get(&self, key: &str) -> Option<V> {
        ConcurrentStore::get(self, key)
    }
    fn contains_key(&self, key: &str) -> bool {
        ConcurrentStore::contains_key(self, key)
    }
    fn contains_value(&self, value: &V) -> bool {
        ConcurrentStore::contains_value(self, value)
    }
    fn put(&self, key: &str, value: V) -> Option<V> {
        ConcurrentStore::put(self, key, value)
    }
    fn remove(&self, key: &str) -> Option<V> {
        ConcurrentStore::remove(self, key)
    }
    fn clear(&self) {
        ConcurrentStore::clear(self)
    }
    fn put_if_absent(&self, key: &str, value: V) -> Option<V> {
        ConcurrentStore::put_if_absent(self, key, value)
    }
    fn replace(&self, key: &str, value: V) -> Option<V> {
        self.replace_when(key, |_| true, value)
    }
    fn replace_if(&self, key: &str, expected: &V, value: V) -> bool {
        self.replace_when(key, |cur| cur == expected, value).is_some()
    }
    fn remove_if(&self, key: &str, expected: &V) -> bool {
        self.remove_when(key, |cur| cur == expected).is_some()
    }
    fn keys(&self) -> Vec<String> {
        ConcurrentStore::keys(self)
    }
    fn values(&self) -> Vec<V> {
        ConcurrentStore::values(self)
    }
}
