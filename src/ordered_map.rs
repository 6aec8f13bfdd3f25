//! OrderedMap: insertion-ordered map backing record values.
//!
//! Layout
//! - `index`: a `ConcurrentStore` from folded key to a slot handle.
//! - `order`: a `SlotMap` arena of nodes linked through `prev`/`next` slot
//!   handles, plus head/tail and the modification counter.
//!
//! Every put, remove and relocation is O(1): the index yields the slot, the
//! slot yields its neighbours. The arena and counter are guarded together
//! by one mutex; the index keeps its own shard locks and is only written
//! while that mutex is held, so lock order is always map mutex -> shard.
//!
//! Keys keep the casing they were first inserted with; lookups fold them
//! through the index when the map is case-insensitive.

use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use core::mem;
use core::ops::{Deref, DerefMut};
use parking_lot::{Mutex, MutexGuard};
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::{DefaultHasher, RandomState};
use tracing::trace;

use crate::concurrent_store::ConcurrentStore;
use crate::config::StoreConfig;
use crate::cursor::{Cursor, Entries, Keys, Values};
use crate::error::{Result, StoreError};
use crate::reentrancy::{DebugReentrancy, ReentrancyGuard};
use crate::store::{Duplicate, KeyValueStore};

/// A key/value pair as stored in an `OrderedMap`.
///
/// Two entries are equal when keys and values are equal; the entry hash is
/// `hash(key) ^ hash(value)` under a fixed hasher so that it agrees across
/// map instances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<V> {
    key: String,
    value: V,
}

impl<V> Entry<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (String, V) {
        (self.key, self.value)
    }
}

impl<V: Hash> Entry<V> {
    pub fn entry_hash(&self) -> u64 {
        entry_hash(&self.key, &self.value)
    }
}

impl<V: Hash> Hash for Entry<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.entry_hash());
    }
}

fn fixed_hash<T: Hash + ?Sized>(t: &T) -> u64 {
    let mut h = DefaultHasher::new();
    t.hash(&mut h);
    h.finish()
}

fn entry_hash<V: Hash>(key: &str, value: &V) -> u64 {
    fixed_hash(key) ^ fixed_hash(value)
}

#[derive(Debug)]
pub(crate) struct Node<V> {
    pub(crate) key: String,
    pub(crate) value: V,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

/// Slot arena plus the intrusive order list threaded through it.
pub(crate) struct Order<V> {
    slots: SlotMap<DefaultKey, Node<V>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
    pub(crate) mod_count: u64,
}

impl<V> Order<V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity(capacity),
            head: None,
            tail: None,
            mod_count: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn head(&self) -> Option<DefaultKey> {
        self.head
    }

    pub(crate) fn node(&self, slot: DefaultKey) -> Option<&Node<V>> {
        self.slots.get(slot)
    }

    pub(crate) fn next_of(&self, slot: DefaultKey) -> Option<DefaultKey> {
        self.slots.get(slot).and_then(|n| n.next)
    }

    fn push_back(&mut self, key: String, value: V) -> DefaultKey {
        let prev = self.tail;
        let slot = self.slots.insert(Node {
            key,
            value,
            prev,
            next: None,
        });
        match prev.and_then(|p| self.slots.get_mut(p)) {
            Some(p) => p.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        slot
    }

    fn unlink(&mut self, slot: DefaultKey) {
        let Some(node) = self.slots.get_mut(slot) else {
            return;
        };
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev.and_then(|p| self.slots.get_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.slots.get_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
    }

    fn link_back(&mut self, slot: DefaultKey) {
        let prev = self.tail;
        let Some(node) = self.slots.get_mut(slot) else {
            return;
        };
        node.prev = prev;
        node.next = None;
        match prev.and_then(|p| self.slots.get_mut(p)) {
            Some(p) => p.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    fn move_to_back(&mut self, slot: DefaultKey) {
        if self.tail == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_back(slot);
    }

    fn remove(&mut self, slot: DefaultKey) -> Option<Node<V>> {
        self.unlink(slot);
        self.slots.remove(slot)
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.head = None;
        self.tail = None;
    }

    pub(crate) fn iter(&self) -> OrderIter<'_, V> {
        OrderIter {
            order: self,
            next: self.head,
        }
    }

    fn first(&self) -> Option<&Node<V>> {
        self.head.and_then(|s| self.slots.get(s))
    }

    fn last(&self) -> Option<&Node<V>> {
        self.tail.and_then(|s| self.slots.get(s))
    }

    fn slot_at(&self, index: usize) -> Result<DefaultKey> {
        self.iter()
            .nth(index)
            .map(|(slot, _)| slot)
            .ok_or(StoreError::OutOfBounds {
                index,
                len: self.len(),
            })
    }
}

/// Walks the order list from head to tail.
pub(crate) struct OrderIter<'a, V> {
    order: &'a Order<V>,
    next: Option<DefaultKey>,
}

impl<'a, V> Iterator for OrderIter<'a, V> {
    type Item = (DefaultKey, &'a Node<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let node = self.order.slots.get(slot)?;
        self.next = node.next;
        Some((slot, node))
    }
}

/// Held order lock. The reentrancy guard is declared first so it is
/// released before the mutex.
pub(crate) struct Locked<'a, V> {
    _reentry: ReentrancyGuard<'a>,
    order: MutexGuard<'a, Order<V>>,
}

impl<V> Deref for Locked<'_, V> {
    type Target = Order<V>;
    fn deref(&self) -> &Order<V> {
        &self.order
    }
}

impl<V> DerefMut for Locked<'_, V> {
    fn deref_mut(&mut self) -> &mut Order<V> {
        &mut self.order
    }
}

pub struct OrderedMap<V, S = RandomState> {
    index: ConcurrentStore<DefaultKey, S>,
    order: Mutex<Order<V>>,
    reentrancy: DebugReentrancy,
    config: StoreConfig,
}

impl<V> OrderedMap<V> {
    /// Case-sensitive map.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Case-insensitive map, the default for record values.
    pub fn new_record() -> Self {
        Self::with_config(StoreConfig::record())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> OrderedMap<V, S>
where
    S: BuildHasher,
{
    pub fn with_config_and_hasher(config: StoreConfig, hasher: S) -> Self {
        Self {
            index: ConcurrentStore::with_config_and_hasher(&config, hasher),
            order: Mutex::new(Order::with_capacity(config.initial_capacity)),
            reentrancy: DebugReentrancy::new(),
            config,
        }
    }

    pub(crate) fn lock(&self) -> Locked<'_, V> {
        let mut reentry = self.reentrancy.enter();
        let order = self.order.lock();
        reentry.claim();
        Locked {
            _reentry: reentry,
            order,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.index.is_case_sensitive()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Runs `f` on the stored key and value while the map is locked.
    pub fn with_entry<R>(&self, key: &str, f: impl FnOnce(&str, &V) -> R) -> Option<R> {
        let order = self.lock();
        let slot = self.index.get(key)?;
        order.node(slot).map(|n| f(&n.key, &n.value))
    }

    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.with_entry(key, |_, v| v.clone())
    }

    pub fn get_entry(&self, key: &str) -> Option<Entry<V>>
    where
        V: Clone,
    {
        self.with_entry(key, |k, v| Entry::new(k, v.clone()))
    }

    /// Insert or overwrite. An existing key keeps its original casing, takes
    /// the new value and moves to the tail; the previous value is returned.
    pub fn put(&self, key: &str, value: V) -> Option<V> {
        let mut order = self.lock();
        Self::put_locked(&self.index, &mut order, key, value)
    }

    fn put_locked(
        index: &ConcurrentStore<DefaultKey, S>,
        order: &mut Order<V>,
        key: &str,
        value: V,
    ) -> Option<V> {
        order.mod_count += 1;
        match index.get(key) {
            Some(slot) => {
                order.move_to_back(slot);
                trace!(key, "relocated existing key to tail");
                order
                    .slots
                    .get_mut(slot)
                    .map(|n| mem::replace(&mut n.value, value))
            }
            None => {
                let slot = order.push_back(key.to_owned(), value);
                index.put(key, slot);
                None
            }
        }
    }

    pub fn put_all<K, I>(&self, entries: I)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut order = self.lock();
        for (k, v) in entries {
            Self::put_locked(&self.index, &mut order, k.as_ref(), v);
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let mut order = self.lock();
        let slot = self.index.get(key)?;
        self.remove_slot(&mut order, slot).map(|n| n.value)
    }

    /// Unlinks `slot` from both the index and the order list.
    pub(crate) fn remove_slot(&self, order: &mut Order<V>, slot: DefaultKey) -> Option<Node<V>> {
        let node = order.remove(slot)?;
        self.index.remove(&node.key);
        order.mod_count += 1;
        Some(node)
    }

    pub fn clear(&self) {
        let mut order = self.lock();
        self.index.clear();
        order.clear();
        order.mod_count += 1;
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.lock().iter().any(|(_, n)| n.value == *value)
    }

    /// Value-only update in place: no relocation, open cursors stay valid.
    pub fn update_value<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut order = self.lock();
        let slot = self.index.get(key)?;
        order.slots.get_mut(slot).map(|n| f(&mut n.value))
    }

    pub fn first(&self) -> Option<Entry<V>>
    where
        V: Clone,
    {
        self.lock()
            .first()
            .map(|n| Entry::new(n.key.clone(), n.value.clone()))
    }

    pub fn first_key(&self) -> Option<String> {
        self.lock().first().map(|n| n.key.clone())
    }

    pub fn first_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.lock().first().map(|n| n.value.clone())
    }

    pub fn last(&self) -> Option<Entry<V>>
    where
        V: Clone,
    {
        self.lock()
            .last()
            .map(|n| Entry::new(n.key.clone(), n.value.clone()))
    }

    pub fn last_key(&self) -> Option<String> {
        self.lock().last().map(|n| n.key.clone())
    }

    pub fn last_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.lock().last().map(|n| n.value.clone())
    }

    // Positional access walks the order list; kept for callers that
    // address record members by position.

    pub fn key_at(&self, index: usize) -> Result<String> {
        let order = self.lock();
        let slot = order.slot_at(index)?;
        Ok(order.node(slot).map(|n| n.key.clone()).unwrap_or_default())
    }

    pub fn value_at(&self, index: usize) -> Result<V>
    where
        V: Clone,
    {
        let order = self.lock();
        let slot = order.slot_at(index)?;
        order
            .node(slot)
            .map(|n| n.value.clone())
            .ok_or(StoreError::OutOfBounds {
                index,
                len: order.len(),
            })
    }

    /// Position of `key` in insertion order, or `len()` when absent.
    pub fn index_of(&self, key: &str) -> usize {
        let order = self.lock();
        match self.index.get(key) {
            Some(slot) => order
                .iter()
                .position(|(s, _)| s == slot)
                .unwrap_or(order.len()),
            None => order.len(),
        }
    }

    /// Keys are unique, so this is `index_of`.
    pub fn last_index_of(&self, key: &str) -> usize {
        self.index_of(key)
    }

    pub fn remove_at(&self, index: usize) -> Result<Entry<V>> {
        let mut order = self.lock();
        let slot = order.slot_at(index)?;
        let len = order.len();
        self.remove_slot(&mut order, slot)
            .map(|n| Entry::new(n.key, n.value))
            .ok_or(StoreError::OutOfBounds { index, len })
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().iter().map(|(_, n)| n.key.clone()).collect()
    }

    /// Alias of `keys`, the record's member sequence.
    pub fn sequence(&self) -> Vec<String> {
        self.keys()
    }

    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.lock().iter().map(|(_, n)| n.value.clone()).collect()
    }

    pub fn entries(&self) -> Vec<Entry<V>>
    where
        V: Clone,
    {
        self.lock()
            .iter()
            .map(|(_, n)| Entry::new(n.key.clone(), n.value.clone()))
            .collect()
    }

    /// Keys in insertion order joined by `delimiter`.
    pub fn key_list(&self, delimiter: &str) -> String {
        let order = self.lock();
        let mut out = String::new();
        for (i, (_, n)) in order.iter().enumerate() {
            if i > 0 {
                out.push_str(delimiter);
            }
            out.push_str(&n.key);
        }
        out
    }

    // Conditional primitives: check and act under one hold of the map lock.

    pub fn put_if_absent(&self, key: &str, value: V) -> Option<V>
    where
        V: Clone,
    {
        let mut order = self.lock();
        if let Some(slot) = self.index.get(key) {
            return order.node(slot).map(|n| n.value.clone());
        }
        order.mod_count += 1;
        let slot = order.push_back(key.to_owned(), value);
        self.index.put(key, slot);
        None
    }

    pub fn replace(&self, key: &str, value: V) -> Option<V> {
        let mut order = self.lock();
        if !self.index.contains_key(key) {
            return None;
        }
        Self::put_locked(&self.index, &mut order, key, value)
    }

    pub fn replace_if(&self, key: &str, expected: &V, value: V) -> bool
    where
        V: PartialEq,
    {
        let mut order = self.lock();
        let matches = self
            .index
            .get(key)
            .and_then(|slot| order.node(slot))
            .is_some_and(|n| n.value == *expected);
        if matches {
            Self::put_locked(&self.index, &mut order, key, value);
        }
        matches
    }

    pub fn remove_if(&self, key: &str, expected: &V) -> bool
    where
        V: PartialEq,
    {
        let mut order = self.lock();
        let Some(slot) = self.index.get(key) else {
            return false;
        };
        if !order.node(slot).is_some_and(|n| n.value == *expected) {
            return false;
        }
        self.remove_slot(&mut order, slot).is_some()
    }

    /// Fail-fast cursor over keys in insertion order.
    pub fn key_cursor(&self) -> Keys<'_, V, S> {
        Cursor::new(self, |k, _| k.to_owned())
    }

    /// Fail-fast cursor over values in insertion order.
    pub fn value_cursor(&self) -> Values<'_, V, S>
    where
        V: Clone,
    {
        Cursor::new(self, |_, v| v.clone())
    }

    /// Fail-fast cursor over entries in insertion order.
    pub fn entry_cursor(&self) -> Entries<'_, V, S>
    where
        V: Clone,
    {
        Cursor::new(self, |k, v| Entry::new(k, v.clone()))
    }

    /// Hash of the entry set, independent of order.
    pub fn content_hash(&self) -> u64
    where
        V: Hash,
    {
        self.lock().iter().fold(0u64, |acc, (_, n)| {
            acc.wrapping_add(entry_hash(&n.key, &n.value))
        })
    }

    pub(crate) fn modification_count(&self) -> u64 {
        self.lock().mod_count
    }

    #[cfg(test)]
    pub(crate) fn index_len(&self) -> usize {
        self.index.len()
    }
}

impl<V, S> OrderedMap<V, S>
where
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Shallow copy: fresh index and order list, values shared by clone.
    pub fn clone_shallow(&self) -> Self {
        let order = self.lock();
        let mut copy =
            Self::with_config_and_hasher(self.config.clone(), self.index.hasher().clone());
        let dst = copy.order.get_mut();
        for (_, n) in order.iter() {
            let slot = dst.push_back(n.key.clone(), n.value.clone());
            copy.index.put(&n.key, slot);
        }
        copy
    }
}

impl<V, S> Clone for OrderedMap<V, S>
where
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        self.clone_shallow()
    }
}

/// Deep copy. Implicit values are carried over by reference rather than
/// duplicated; the copy fails as a whole when any other value cannot be
/// duplicated. Self-referential records are not detected and recurse
/// without bound.
impl<V, S> Duplicate for OrderedMap<V, S>
where
    V: Duplicate + Clone,
    S: BuildHasher + Clone,
{
    fn duplicate(&self) -> Option<Self> {
        // Snapshot first so nested duplicates never run under our lock.
        let snapshot = self.entries();
        let copy =
            Self::with_config_and_hasher(self.config.clone(), self.index.hasher().clone());
        for entry in snapshot {
            let value = if entry.value.is_implicit() {
                entry.value
            } else {
                entry.value.duplicate()?
            };
            copy.put(&entry.key, value);
        }
        Some(copy)
    }
}

impl<V, S> PartialEq for OrderedMap<V, S>
where
    V: PartialEq + Clone,
    S: BuildHasher,
{
    /// Equal when the entry sets are equal, whatever the insertion order.
    fn eq(&self, other: &Self) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        let theirs = other.entries();
        let order = self.lock();
        order.len() == theirs.len()
            && theirs.iter().all(|e| {
                self.index
                    .get(e.key())
                    .and_then(|slot| order.node(slot))
                    .is_some_and(|n| n.key == e.key && n.value == e.value)
            })
    }
}

impl<V, S> Eq for OrderedMap<V, S>
where
    V: Eq + Clone,
    S: BuildHasher,
{
}

impl<V, S> Hash for OrderedMap<V, S>
where
    V: Hash,
    S: BuildHasher,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.content_hash());
    }
}

impl<V, S> fmt::Debug for OrderedMap<V, S>
where
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.lock();
        f.debug_map()
            .entries(order.iter().map(|(_, n)| (&n.key, &n.value)))
            .finish()
    }
}

impl<V, S> fmt::Display for OrderedMap<V, S>
where
    V: fmt::Display,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.lock();
        f.write_str("{")?;
        for (i, (_, n)) in order.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", n.key, n.value)?;
        }
        f.write_str("}")
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedMap<V>
where
    K: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = OrderedMap::new();
        map.put_all(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for OrderedMap<V, S>
where
    K: AsRef<str>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.put_all(iter);
    }
}

impl<V, S> KeyValueStore<V> for OrderedMap<V, S>
where
    V: Clone + PartialEq,
    S: BuildHasher,
{
    fn is_case_sensitive(&self) -> bool {
        OrderedMap::is_case_sensitive(self)
    }
    fn len(&self) -> usize {
        OrderedMap::len(self)
    }
    fn get(&self, key: &str) -> Option<V> {
        OrderedMap::get(self, key)
    }
    fn contains_key(&self, key: &str) -> bool {
        OrderedMap::contains_key(self, key)
    }
    fn contains_value(&self, value: &V) -> bool {
        OrderedMap::contains_value(self, value)
    }
    fn put(&self, key: &str, value: V) -> Option<V> {
        OrderedMap::put(self, key, value)
    }
    fn remove(&self, key: &str) -> Option<V> {
        OrderedMap::remove(self, key)
    }
    fn clear(&self) {
        OrderedMap::clear(self)
    }
    fn put_if_absent(&self, key: &str, value: V) -> Option<V> {
        OrderedMap::put_if_absent(self, key, value)
    }
    fn replace(&self, key: &str, value: V) -> Option<V> {
        OrderedMap::replace(self, key, value)
    }
    fn replace_if(&self, key: &str, expected: &V, value: V) -> bool {
        OrderedMap::replace_if(self, key, expected, value)
    }
    fn remove_if(&self, key: &str, expected: &V) -> bool {
        OrderedMap::remove_if(self, key, expected)
    }
    fn keys(&self) -> Vec<String> {
        OrderedMap::keys(self)
    }
    fn values(&self) -> Vec<V> {
        OrderedMap::values(self)
    }
}
