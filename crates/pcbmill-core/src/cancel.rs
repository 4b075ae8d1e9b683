//! Cooperative cancellation
//!
//! Parsing and toolpath generation poll a shared flag at every loop
//! iteration. A cancelled operation reports [`crate::Error::Cancelled`]
//! (or its crate-local equivalent), never a normal failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable flag shared between the caller and a long-running operation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        tracing::debug!("cancellation requested");
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Error::Cancelled)` once cancellation has been requested
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(other.check(), Err(crate::Error::Cancelled)));
    }

    #[test]
    fn test_check_ok_when_live() {
        assert!(CancellationToken::new().check().is_ok());
    }
}
