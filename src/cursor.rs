//! Fail-fast cursors over an `OrderedMap`.
//!
//! One cursor type walks the order list; a projection function picks what
//! each step yields. `Keys`, `Values` and `Entries` are the three
//! projections handed out by the map.
//!
//! The cursor records the map's modification counter when created. Any
//! structural change made by someone else is reported as
//! `StoreError::ConcurrentMutation` on the next step. Removals made through
//! the cursor itself advance the recorded counter, so iteration may
//! continue afterwards.

use core::hash::BuildHasher;
use slotmap::DefaultKey;
use std::collections::hash_map::RandomState;
use tracing::trace;

use crate::error::{Result, StoreError};
use crate::ordered_map::{Entry, OrderedMap};

pub struct Cursor<'a, V, S, T> {
    map: &'a OrderedMap<V, S>,
    project: fn(&str, &V) -> T,
    expected: u64,
    started: bool,
    /// Slot the next step yields.
    pending: Option<DefaultKey>,
    /// Slot most recently yielded.
    current: Option<DefaultKey>,
    can_remove: bool,
    failed: bool,
}

pub type Keys<'a, V, S = RandomState> = Cursor<'a, V, S, String>;
pub type Values<'a, V, S = RandomState> = Cursor<'a, V, S, V>;
pub type Entries<'a, V, S = RandomState> = Cursor<'a, V, S, Entry<V>>;

impl<'a, V, S, T> Cursor<'a, V, S, T>
where
    S: BuildHasher,
{
    pub(crate) fn new(map: &'a OrderedMap<V, S>, project: fn(&str, &V) -> T) -> Self {
        let expected = map.modification_count();
        Self {
            map,
            project,
            expected,
            started: false,
            pending: None,
            current: None,
            can_remove: false,
            failed: false,
        }
    }

    /// Whether another step would yield an item, ignoring foreign changes.
    pub fn has_next(&self) -> bool {
        let order = self.map.lock();
        let next = if self.started {
            self.pending
        } else {
            order.head()
        };
        next.is_some_and(|slot| order.node(slot).is_some())
    }

    /// Advance and project the next entry; `Ok(None)` once exhausted.
    pub fn try_next(&mut self) -> Result<Option<T>> {
        let order = self.map.lock();
        if order.mod_count != self.expected {
            return Err(StoreError::ConcurrentMutation);
        }
        let slot = if self.started {
            self.pending
        } else {
            self.started = true;
            order.head()
        };
        let Some((slot, node)) = slot.and_then(|s| order.node(s).map(|n| (s, n))) else {
            return Ok(None);
        };
        self.pending = order.next_of(slot);
        self.current = Some(slot);
        self.can_remove = true;
        Ok(Some((self.project)(&node.key, &node.value)))
    }

    /// Remove the entry most recently yielded by `try_next`.
    pub fn remove(&mut self) -> Result<()> {
        if !self.can_remove {
            return Err(StoreError::IllegalState("remove() must follow next()"));
        }
        let mut order = self.map.lock();
        if order.mod_count != self.expected {
            return Err(StoreError::ConcurrentMutation);
        }
        let slot = self
            .current
            .ok_or(StoreError::IllegalState("remove() must follow next()"))?;
        if let Some(node) = self.map.remove_slot(&mut order, slot) {
            trace!(key = %node.key, "removed entry through cursor");
        }
        self.expected = order.mod_count;
        self.can_remove = false;
        Ok(())
    }
}

impl<V, S, T> Iterator for Cursor<'_, V, S, T>
where
    S: BuildHasher,
{
    type Item = Result<T>;

    /// Yields `Err` once on a detected mutation and then stops.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.try_next() {
            Ok(item) => item.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
