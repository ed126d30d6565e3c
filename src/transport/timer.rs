//! Timer collaborator.
//!
//! Reconnection delays and keep-alive intervals go through a [`Timer`] so
//! tests can drive time by hand. [`TokioTimer`] is the production
//! implementation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::identifiers::TimerId;

// ============================================================================
// Types
// ============================================================================

/// One-shot timer callback.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// Timer
// ============================================================================

/// Schedules one-shot callbacks.
pub trait Timer: Send + Sync {
    /// Runs `callback` once after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// never scheduled.
    fn cancel(&self, id: TimerId) -> bool;
}

// ============================================================================
// TokioTimer
// ============================================================================

/// Timer backed by `tokio::time::sleep`.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioTimer {
    pending: Arc<Mutex<FxHashMap<TimerId, AbortHandle>>>,
}

impl TokioTimer {
    /// Creates a new timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of timers that have not fired yet.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId::next();
        let pending = Arc::clone(&self.pending);

        // Holding the lock across spawn keeps the task from removing its
        // entry before it is inserted.
        let mut guard = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if pending.lock().remove(&id).is_some() {
                trace!(%id, "Timer fired");
                callback();
            }
        });
        guard.insert(id, handle.abort_handle());

        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        match self.pending.lock().remove(&id) {
            Some(handle) => {
                handle.abort();
                trace!(%id, "Timer cancelled");
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        timer.schedule(
            Duration::from_millis(500),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(timer.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timer = TokioTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let id = timer.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(timer.cancel(id));
        assert!(!timer.cancel(id));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
