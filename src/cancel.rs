use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{CciError, Result};

/// Shared cancellation flag checked between pagination pages and batch waves.
///
/// Clones observe the same flag, so a tool-call boundary can hand one clone to
/// the running operation and keep another to trip it.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns `Err(CciError::Cancelled)` once the signal has been tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CciError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let signal = CancellationSignal::new();
        let handle = signal.clone();
        assert!(signal.check().is_ok());

        handle.cancel();

        assert!(signal.is_cancelled());
        assert!(matches!(signal.check(), Err(CciError::Cancelled)));
    }
}
