//! Progress reporting and cooperative cancellation for long-running
//! operations.
//!
//! Operations take `Option<&mut ProgressFn>` and an optional [`CancelToken`];
//! the collaborators translate these to whatever event model they use.
//! Callbacks run synchronously on the producing thread, and `current` is
//! non-decreasing across a single operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One progress notification, emitted at chunk boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Progress sink: any mutable closure over [`ProgressUpdate`].
pub type ProgressFn<'a> = dyn FnMut(ProgressUpdate) + 'a;

/// Cooperative cancellation handle.
///
/// Cloned handles share the same flag. Long-running operations check it
/// between chunks and return [`EngineError::Cancelled`] with no partial
/// result once it is set.
///
/// [`EngineError::Cancelled`]: crate::EngineError::Cancelled
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_clear_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
