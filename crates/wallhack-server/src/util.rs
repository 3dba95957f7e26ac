//! Utility types for server operations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Tracks active sessions for graceful shutdown.
#[derive(Clone, Default)]
pub(crate) struct SessionTracker {
    active: Arc<AtomicUsize>,
    zero_notify: Arc<Notify>,
}

impl SessionTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        // AcqRel: Acquire to see previous increments, Release to make the
        // decrement visible to count().
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.zero_notify.notify_waiters();
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Waits until no sessions remain, up to `timeout`. Returns whether the
    /// count actually reached zero.
    pub(crate) async fn wait_for_zero(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count() == 0 {
                return true;
            }
            tokio::select! {
                _ = self.zero_notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return self.count() == 0,
            }
        }
    }
}

/// Guard that decrements the session count on drop.
pub(crate) struct SessionGuard {
    tracker: SessionTracker,
}

impl SessionGuard {
    pub(crate) fn new(tracker: SessionTracker) -> Self {
        tracker.increment();
        Self { tracker }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.decrement();
    }
}
