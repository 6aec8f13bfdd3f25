//! NullStore: the store used where a scope has nowhere to keep values.
//! Always empty; writes are accepted and discarded.

use core::fmt;
use core::marker::PhantomData;

use crate::store::KeyValueStore;

pub struct NullStore<V>(PhantomData<fn() -> V>);

impl<V> NullStore<V> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for NullStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for NullStore<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V> Copy for NullStore<V> {}

impl<V> fmt::Debug for NullStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NullStore")
    }
}

impl<V: Clone + PartialEq> KeyValueStore<V> for NullStore<V> {
    fn is_case_sensitive(&self) -> bool {
        false
    }
    fn len(&self) -> usize {
        0
    }
    fn get(&self, _key: &str) -> Option<V> {
        None
    }
    fn contains_key(&self, _key: &str) -> bool {
        false
    }
    fn contains_value(&self, _value: &V) -> bool {
        false
    }
    fn put(&self, _key: &str, _value: V) -> Option<V> {
        None
    }
    fn remove(&self, _key: &str) -> Option<V> {
        None
    }
    fn clear(&self) {}
    fn put_if_absent(&self, _key: &str, _value: V) -> Option<V> {
        None
    }
    fn replace(&self, _key: &str, _value: V) -> Option<V> {
        None
    }
    fn replace_if(&self, _key: &str, _expected: &V, _value: V) -> bool {
        false
    }
    fn remove_if(&self, _key: &str, _expected: &V) -> bool {
        false
    }
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
    fn values(&self) -> Vec<V> {
        Vec::new()
    }
}
