//! Periodic `KeepAlive` while the socket is open.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::identifiers::TimerId;
use crate::protocol::SessionEvent;
use crate::session::{LiveSession, WeakSession};
use crate::transport::Timer;

use super::behavior::Behavior;

// ============================================================================
// KeepAliveConfig
// ============================================================================

/// Default interval between keep-alive messages, in milliseconds.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 5000;

/// Keep-alive parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    /// Interval between messages, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_KEEP_ALIVE_INTERVAL_MS
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_KEEP_ALIVE_INTERVAL_MS,
        }
    }
}

impl KeepAliveConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval.
    #[must_use]
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Returns the interval.
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ============================================================================
// KeepAlive
// ============================================================================

#[derive(Default)]
struct TickState {
    timer: Option<TimerId>,
    released: bool,
}

struct KeepAliveInner {
    config: KeepAliveConfig,
    timer: Arc<dyn Timer>,
    state: Mutex<TickState>,
}

/// Sends `KeepAlive` every interval from `open` until `close`.
pub struct KeepAlive {
    inner: Arc<KeepAliveInner>,
}

impl KeepAlive {
    /// Creates the behavior. Nothing is scheduled until `open`.
    #[must_use]
    pub fn new(config: KeepAliveConfig, timer: Arc<dyn Timer>) -> Self {
        Self {
            inner: Arc::new(KeepAliveInner {
                config,
                timer,
                state: Mutex::new(TickState::default()),
            }),
        }
    }

    /// Returns `true` while a tick is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }
}

fn schedule_tick(inner: &Arc<KeepAliveInner>, state: &mut TickState, session: WeakSession) {
    let weak: Weak<KeepAliveInner> = Arc::downgrade(inner);
    let id = inner
        .timer
        .schedule(inner.config.interval(), Box::new(move || tick(&weak, &session)));
    state.timer = Some(id);
}

fn tick(inner: &Weak<KeepAliveInner>, target: &WeakSession) {
    let (Some(inner), Some(session)) = (inner.upgrade(), target.upgrade()) else {
        return;
    };

    {
        let mut state = inner.state.lock();
        state.timer = None;
        if state.released || !session.is_open() {
            return;
        }
    }

    // Sending may emit events, which reach `observe` and take the lock.
    trace!(session_id = %session.id(), "Sending keep-alive");
    if let Err(e) = session.keep_alive() {
        warn!(session_id = %session.id(), error = %e, "Keep-alive failed");
    }

    let mut state = inner.state.lock();
    if !state.released && state.timer.is_none() {
        schedule_tick(&inner, &mut state, session.downgrade());
    }
}

impl Behavior for KeepAlive {
    fn name(&self) -> &'static str {
        "keep_alive"
    }

    fn observe(&self, session: &LiveSession, event: &SessionEvent, _out: &mut Vec<SessionEvent>) {
        match event {
            SessionEvent::Open => {
                let mut state = self.inner.state.lock();
                if state.released {
                    return;
                }
                if let Some(id) = state.timer.take() {
                    self.inner.timer.cancel(id);
                }
                schedule_tick(&self.inner, &mut state, session.downgrade());
            }
            SessionEvent::Close { .. } => {
                if let Some(id) = self.inner.state.lock().timer.take() {
                    self.inner.timer.cancel(id);
                }
            }
            _ => {}
        }
    }

    fn on_release(&self) {
        let mut state = self.inner.state.lock();
        state.released = true;
        if let Some(id) = state.timer.take() {
            self.inner.timer.cancel(id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
