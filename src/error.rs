//! Error types surfaced by stores and cursors.

use std::io;
use thiserror::Error;

/// Failures raised by the ordered map, its cursors and the wire codec.
///
/// Lock contention is never an error; `NamedLock::lock` reports it as
/// `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The map changed structurally since the cursor last synchronized.
    #[error("map was structurally modified while a cursor was open")]
    ConcurrentMutation,
    /// Cursor protocol misuse, e.g. `remove()` without a preceding `next()`.
    #[error("illegal cursor state: {0}")]
    IllegalState(&'static str),
    /// Positional access outside `[0, len)`.
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    /// Wire form carried a negative entry count.
    #[error("negative entry count {0} in serialized map")]
    NegativeCount(i32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Returned when a lock mode string is neither exclusive nor read-only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown lock mode {0:?}")]
pub struct ParseLockModeError(pub String);
