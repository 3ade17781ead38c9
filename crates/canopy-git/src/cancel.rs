//! Cooperative cancellation for the synchronous, thread-based execution
//! model described in spec section 5.
//!
//! There is no async runtime anywhere in this repository (the teacher and
//! the wider retrieval pack do their parallel work with OS threads and
//! channels, not futures), so cancellation is a plain shared flag checked
//! at the suspension points spec section 5 names: before each retry wait,
//! before and during each network/filesystem call, and while polling for a
//! lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GitError;

/// A cheaply cloneable, thread-safe cancellation flag.
///
/// Cloning a `CancelToken` shares the same underlying flag — cancelling any
/// clone cancels all of them. Construct one per top-level request and hand
/// clones down to every operation that request fans out to.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Mark this token (and all of its clones) as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(GitError::Cancelled)` if cancelled, `Ok(())` otherwise.
    /// Call this at each suspension point before doing further work.
    pub fn check(&self) -> Result<(), GitError> {
        if self.is_cancelled() {
            Err(GitError::Cancelled)
        } else {
            Ok(())
        }
    }
}
