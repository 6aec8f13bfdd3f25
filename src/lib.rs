//! record-store: the associative storage and locking core of a scripting
//! runtime. Variable scopes, record values and application-wide caches
//! all keep their members in one of the stores below.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one small set of thread-safe maps whose keys may fold case,
//!   plus the named locks scripts use to serialize access to them.
//! - Layers:
//!   - KeyNormalizer: the case-folding rule a store applies to keys on
//!     every lookup and insert.
//!   - ConcurrentStore<V, S>: sharded hash table, one `RwLock` per shard,
//!     storing precomputed hashes. Backs every other map in the crate.
//!   - OrderedMap<V, S>: insertion-ordered record map. A `ConcurrentStore`
//!     indexes folded keys to slots of a `slotmap` arena threaded with
//!     prev/next links; arena and modification counter sit behind one
//!     mutex. Cursors over it are fail-fast.
//!   - IdleStore<V>: `ConcurrentStore` whose entries are evicted after two
//!     sweeps without a read.
//!   - NamedLock / LockRegistry: reentrant reader/writer locks owned by
//!     execution contexts, created by name on demand and retired when
//!     free.
//!   - NullStore<V>: always empty.
//!
//! Constraints
//! - Every store is `Send + Sync` when its values are; all operations
//!   take `&self`.
//! - Lock order: ordered map mutex before shard locks; registry shard lock
//!   before a named lock's own mutex. Nothing calls back into user code
//!   while a shard lock is held except `V: Clone`/`PartialEq` during
//!   conditional operations.
//! - Periodic work never starts a timer of its own; it registers with an
//!   injected `Scheduler` and is cancelled when its owner drops.
//!
//! Reentrancy
//! - `parking_lot` mutexes are not reentrant. OrderedMap wraps its mutex
//!   in a debug-only guard that panics on same-thread reentry instead of
//!   deadlocking, which surfaces values whose `Clone`/`PartialEq`/`Hash`
//!   reach back into the map holding them.
//! - Equality and deep copy snapshot the other side before taking their
//!   own lock, so comparing two maps never holds both mutexes.
//!
//! Key casing
//! - Case-insensitive stores index by the lowercased key. OrderedMap also
//!   remembers the casing a key was first inserted with and reports that
//!   from `keys()`; ConcurrentStore and IdleStore report folded keys.
//!
//! Notes and non-goals
//! - Only lock acquisition has a timeout; store operations never block
//!   beyond short critical sections.
//! - Deep copies (`Duplicate`) of self-referential records recurse without
//!   bound; cyclic value graphs are not supported.
//! - No subscriber is installed; diagnostics go through `tracing`.

mod concurrent_store;
mod config;
mod cursor;
mod error;
mod idle_store;
mod key;
mod lock_registry;
mod named_lock;
mod null_store;
mod ordered_map;
mod ordered_map_proptest;
mod reentrancy;
mod scheduler;
mod store;
pub mod wire;

// Public surface
pub use concurrent_store::ConcurrentStore;
pub use config::{IdleConfig, LockConfig, StoreConfig};
pub use cursor::{Cursor, Entries, Keys, Values};
pub use error::{ParseLockModeError, Result, StoreError};
pub use idle_store::{EvictionCallback, IdleStore};
pub use key::KeyNormalizer;
pub use lock_registry::{LockHandle, LockRegistry};
pub use named_lock::{ContextId, LockGuard, LockMode, NamedLock};
pub use null_store::NullStore;
pub use ordered_map::{Entry, OrderedMap};
pub use reentrancy::{DebugReentrancy, ReentrancyGuard};
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, TickListener, TimerId};
pub use store::{Duplicate, KeyValueStore};
pub use wire::{Utf8KeyCodec, WireCodec};
