//! Cancellation handle propagated through read-through calls.
//!
//! A [`CancelToken`] is a cheap, clonable flag the caller can trip to abandon
//! a read-through call. The cache hands the token to every fetch callback so
//! upstream clients can abort their own I/O. Cancellation is advisory:
//! background refreshes are shared work and run to completion, and a
//! single-flight leader always finishes its fetch so the cache gets
//! populated for future callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A clonable cancellation flag.
///
/// All clones observe the same flag; cancelling any clone cancels them all.
///
/// # Example
///
/// ```
/// use stampede::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the flag. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any
    /// clone of this token.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
