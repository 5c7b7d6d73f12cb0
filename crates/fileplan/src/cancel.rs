//! Cancellation tokens for match scans and conflict resolution.
//!
//! A token is cheap to clone; every clone observes the same flag. Long record
//! scans call [`CancellationToken::is_cancelled_sparse`] so the atomic is only
//! read once per batch of records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default number of records processed between cancellation checks.
pub const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token nobody holds a trigger for.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Signals every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `Some(())` while still active and `None` once cancelled, so
    /// callers can bail out with `?`.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            None
        } else {
            Some(())
        }
    }

    /// Checks the flag only when `counter` is a multiple of `interval`.
    #[inline]
    pub fn is_cancelled_sparse(&self, counter: usize, interval: usize) -> Option<()> {
        if interval <= 1 || counter % interval == 0 {
            self.is_cancelled()
        } else {
            Some(())
        }
    }

    pub fn cancelled(&self) -> bool {
        self.is_cancelled().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_token_is_never_cancelled() {
        let token = CancellationToken::noop();
        assert!(token.is_cancelled().is_some());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled().is_none());
        assert!(observer.cancelled());
    }

    #[test]
    fn sparse_check_skips_between_intervals() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled_sparse(3, 4).is_some());
        assert!(token.is_cancelled_sparse(4, 4).is_none());
    }
}
