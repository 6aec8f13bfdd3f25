//! Debug-only reentrancy guard for mutex-protected structures.
//!
//! `parking_lot::Mutex` is not reentrant: a value whose `Clone`,
//! `PartialEq` or `Hash` calls back into the map that is currently
//! cloning or comparing it would deadlock. In debug builds the guard
//! records which thread holds the protected section and panics on a nested
//! entry from that same thread. In release builds this compiles to a
//! zero-cost no-op.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, non-zero identifier of the calling thread.
pub(crate) fn thread_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// Per-instance reentrancy tracker. Call `enter` before taking the
/// protected lock and `claim` once it is held.
#[derive(Debug, Default)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    owner: AtomicU64,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: AtomicU64::new(0),
        }
    }

    /// Enter a guarded section. In debug builds, panics if the calling
    /// thread is already inside it.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let me = thread_token();
            assert!(
                self.owner.load(Ordering::Acquire) != me,
                "reentrancy detected: nested entry into data structure"
            );
            ReentrancyGuard {
                owner: self,
                me,
                claimed: false,
            }
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard {
                _z: core::marker::PhantomData,
            }
        }
    }
}

/// RAII guard returned by `DebugReentrancy::enter`. Must be dropped before
/// the protected lock is released.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(debug_assertions)]
    me: u64,
    #[cfg(debug_assertions)]
    claimed: bool,
    #[cfg(not(debug_assertions))]
    _z: core::marker::PhantomData<&'a ()>,
}

impl ReentrancyGuard<'_> {
    /// Mark the section as held by this thread. Only valid once the
    /// protected lock is acquired.
    #[inline]
    pub fn claim(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.owner.store(self.me, Ordering::Release);
            self.claimed = true;
        }
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            if self.claimed {
                self.owner.owner.store(0, Ordering::Release);
            }
        }
    }
}
