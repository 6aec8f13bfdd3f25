//! NamedLock: a reentrant reader/writer lock owned by execution contexts.
//!
//! Ownership is tracked per `ContextId` rather than per OS thread, so a
//! runtime may hand a request from one worker thread to another while it
//! keeps its locks. Each holder records separate shared and exclusive
//! hold counts; the context's entry disappears when both reach zero.
//!
//! Admission, decided under the lock's own mutex:
//! - shared by `c`: no other context holds exclusive;
//! - exclusive by `c`: no other context holds anything.
//!
//! A context may therefore take exclusive while it is the only shared
//! holder, and shared while it holds exclusive.
//!
//! Acquisition polls with a doubling sleep instead of parking on a
//! condition variable; a timed-out caller makes one final attempt.

use core::fmt;
use core::str::FromStr;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::LockConfig;
use crate::error::ParseLockModeError;
use crate::reentrancy::thread_token;

/// Identifies the execution context that owns lock holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Stable id for the calling thread, for runtimes that run each
    /// request on a single thread.
    pub fn current() -> Self {
        Self(thread_token())
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read-only: any number of contexts at once.
    Shared,
    Exclusive,
}

impl FromStr for LockMode {
    type Err = ParseLockModeError;

    /// Accepts the lock tag spellings `exclusive` and `readonly`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("exclusive") {
            Ok(LockMode::Exclusive)
        } else if s.eq_ignore_ascii_case("readonly") {
            Ok(LockMode::Shared)
        } else {
            Err(ParseLockModeError(s.to_owned()))
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockMode::Shared => "readonly",
            LockMode::Exclusive => "exclusive",
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Holds {
    shared: u32,
    exclusive: u32,
}

impl Holds {
    fn count_mut(&mut self, mode: LockMode) -> &mut u32 {
        match mode {
            LockMode::Shared => &mut self.shared,
            LockMode::Exclusive => &mut self.exclusive,
        }
    }

    fn count(&self, mode: LockMode) -> u32 {
        match mode {
            LockMode::Shared => self.shared,
            LockMode::Exclusive => self.exclusive,
        }
    }

    fn is_empty(&self) -> bool {
        self.shared == 0 && self.exclusive == 0
    }
}

#[derive(Debug, Default)]
struct LockState {
    holders: HashMap<ContextId, Holds>,
    /// Outstanding handles; a referenced lock is never retired.
    refs: usize,
}

impl LockState {
    fn admits(&self, ctx: ContextId, mode: LockMode) -> bool {
        let mut others = self.holders.iter().filter(|(c, _)| **c != ctx);
        match mode {
            LockMode::Shared => others.all(|(_, h)| h.exclusive == 0),
            LockMode::Exclusive => others.all(|(_, h)| h.is_empty()),
        }
    }
}

pub struct NamedLock {
    name: String,
    state: Mutex<LockState>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl NamedLock {
    pub fn new(name: impl Into<String>, config: &LockConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LockState::default()),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One admission attempt; never waits.
    pub fn try_lock(&self, ctx: ContextId, mode: LockMode) -> bool {
        let mut state = self.state.lock();
        if !state.admits(ctx, mode) {
            return false;
        }
        *state.holders.entry(ctx).or_default().count_mut(mode) += 1;
        true
    }

    /// Acquire within `timeout`. Returns `false` on timeout; contention is
    /// never an error.
    pub fn lock(&self, ctx: ContextId, mode: LockMode, timeout: Duration) -> bool {
        if self.try_lock(ctx, mode) {
            debug!(lock = %self.name, ?ctx, %mode, "granted");
            return true;
        }
        let start = Instant::now();
        let mut backoff = self.initial_backoff;
        while start.elapsed() < timeout {
            let remaining = timeout.saturating_sub(start.elapsed());
            std::thread::sleep(backoff.min(remaining));
            if self.try_lock(ctx, mode) {
                debug!(lock = %self.name, ?ctx, %mode, waited = ?start.elapsed(), "granted");
                return true;
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }
        let granted = self.try_lock(ctx, mode);
        if granted {
            debug!(lock = %self.name, ?ctx, %mode, "granted on final attempt");
        } else {
            debug!(lock = %self.name, ?ctx, %mode, ?timeout, "timed out");
        }
        granted
    }

    /// Drop one hold of `mode`. Unlocking a mode not held is a no-op.
    pub fn unlock(&self, ctx: ContextId, mode: LockMode) {
        let mut state = self.state.lock();
        let Some(holds) = state.holders.get_mut(&ctx) else {
            warn!(lock = %self.name, ?ctx, %mode, "unlock by context holding nothing");
            return;
        };
        let count = holds.count_mut(mode);
        if *count == 0 {
            warn!(lock = %self.name, ?ctx, %mode, "unlock of mode not held");
            return;
        }
        *count -= 1;
        if holds.is_empty() {
            state.holders.remove(&ctx);
        }
    }

    /// Acquire and wrap the hold in a guard that releases it on drop.
    pub fn guard(
        &self,
        ctx: ContextId,
        mode: LockMode,
        timeout: Duration,
    ) -> Option<LockGuard<'_>> {
        self.lock(ctx, mode, timeout).then_some(LockGuard {
            lock: self,
            ctx,
            mode,
        })
    }

    /// No holders and no outstanding handles.
    pub fn is_free(&self) -> bool {
        let state = self.state.lock();
        state.holders.is_empty() && state.refs == 0
    }

    pub fn hold_count(&self, ctx: ContextId, mode: LockMode) -> u32 {
        self.state
            .lock()
            .holders
            .get(&ctx)
            .map_or(0, |h| h.count(mode))
    }

    /// Number of contexts holding the lock in any mode.
    pub fn holder_count(&self) -> usize {
        self.state.lock().holders.len()
    }

    pub(crate) fn acquire_ref(&self) {
        self.state.lock().refs += 1;
    }

    pub(crate) fn release_ref(&self) {
        let mut state = self.state.lock();
        state.refs = state.refs.saturating_sub(1);
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.state.lock().refs
    }
}

impl fmt::Debug for NamedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NamedLock")
            .field("name", &self.name)
            .field("holders", &state.holders.len())
            .field("refs", &state.refs)
            .finish()
    }
}

/// One hold of a `NamedLock`, released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a NamedLock,
    ctx: ContextId,
    mode: LockMode,
}

impl LockGuard<'_> {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn context(&self) -> ContextId {
        self.ctx
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock(self.ctx, self.mode);
    }
}
