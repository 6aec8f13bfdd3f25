//! Contracts shared by every store in the crate and by stored values.

/// Deep-copy contract supplied by the value subsystem.
///
/// `Clone` on a stored value copies the reference (for example an `Arc`);
/// `duplicate` produces an independent copy of composite values.
pub trait Duplicate: Sized {
    /// Independent copy, or `None` if the value cannot be duplicated.
    fn duplicate(&self) -> Option<Self>;

    /// Internal runtime values that deep copies share by reference
    /// instead of duplicating.
    fn is_implicit(&self) -> bool {
        false
    }
}

/// Map surface implemented by `ConcurrentStore`, `OrderedMap`, `IdleStore`
/// and `NullStore`, so callers can swap one for another.
///
/// All methods take `&self`: implementations synchronize internally. Values
/// are returned by clone, which for reference-counted values copies the
/// reference only.
pub trait KeyValueStore<V: Clone + PartialEq> {
    fn is_case_sensitive(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &str) -> Option<V>;

    fn contains_key(&self, key: &str) -> bool;

    fn contains_value(&self, value: &V) -> bool;

    /// Insert or overwrite; returns the previous value.
    fn put(&self, key: &str, value: V) -> Option<V>;

    fn remove(&self, key: &str) -> Option<V>;

    fn clear(&self);

    /// Insert only if absent; returns the value already present otherwise.
    fn put_if_absent(&self, key: &str, value: V) -> Option<V>;

    /// Overwrite only if present; returns the previous value.
    fn replace(&self, key: &str, value: V) -> Option<V>;

    /// Overwrite only if the current value equals `expected`.
    fn replace_if(&self, key: &str, expected: &V, value: V) -> bool;

    /// Remove only if the current value equals `expected`.
    fn remove_if(&self, key: &str, expected: &V) -> bool;

    fn keys(&self) -> Vec<String>;

    fn values(&self) -> Vec<V>;
}
