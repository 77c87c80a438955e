//! Open source-handle accounting.
//!
//! Every frame source holds a [`HandleLease`] for as long as its decoder
//! resource is alive. The lease is returned on drop, so normal end of stream,
//! errors and consumer cancellation all release it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::metrics;

/// Counts decoder handles currently held open.
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    open: Arc<AtomicUsize>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened handle.
    pub fn acquire(&self, label: impl Into<String>) -> HandleLease {
        let label = label.into();
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_open_sources(now_open);
        debug!(source = %label, open = now_open, "Acquired source handle");
        HandleLease {
            open: Arc::clone(&self.open),
            label,
        }
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Proof that one decoder handle is open. Released on drop.
#[derive(Debug)]
pub struct HandleLease {
    open: Arc<AtomicUsize>,
    label: String,
}

impl HandleLease {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        let now_open = self.open.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_open_sources(now_open);
        debug!(source = %self.label, open = now_open, "Released source handle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_released_on_drop() {
        let tracker = HandleTracker::new();
        let a = tracker.acquire("a");
        let b = tracker.acquire("b");
        assert_eq!(tracker.open_handles(), 2);
        drop(a);
        assert_eq!(tracker.open_handles(), 1);
        assert_eq!(b.label(), "b");
        drop(b);
        assert_eq!(tracker.open_handles(), 0);
    }
}
