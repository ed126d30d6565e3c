//! Reconnection policy.
//!
//! A bounded state machine driven by `close` and `open` events:
//!
//! | Event | Condition | Effect |
//! |-------|-----------|--------|
//! | `close` | code 1000, or close requested | nothing |
//! | `close` | `attempts >= max_attempts` | `reconnect_failed`, counter reset |
//! | `close` | otherwise | `reconnecting`, timer scheduled |
//! | timer | session still wanted | resume params merged, `reconnect` |
//! | `open` | `attempts > 0` | `reconnected`, counter reset |
//! | `Metadata` | carries resume ids | resume context updated |
//!
//! The delay before attempt `n` (0-based) is
//! `min(base_delay_ms * 2^n, max_delay_ms)`, scaled by a uniform factor in
//! `[0.5, 1.0]` when jitter is on.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::identifiers::{SessionId, TimerId};
use crate::middleware::MiddlewareContext;
use crate::protocol::SessionEvent;
use crate::session::{Credentials, LiveOptions, LiveSession, ResumeContext, WeakSession};
use crate::transport::{NORMAL_CLOSURE, Timer};

use super::behavior::Behavior;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay before the first attempt, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default delay cap, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.0;

// ============================================================================
// ResumeParams
// ============================================================================

/// Handshake additions that resume a server-side session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeParams {
    /// Extra handshake headers.
    pub headers: BTreeMap<String, String>,
    /// Extra query parameters.
    pub query: BTreeMap<String, String>,
}

impl ResumeParams {
    /// Converts into connect options for [`LiveSession::reconnect`].
    #[must_use]
    pub fn into_options(self) -> LiveOptions {
        let mut options = LiveOptions::new();
        options.query = self.query;
        options.headers = self.headers;
        options
    }
}

/// Maps a resume context to handshake additions.
#[derive(Clone)]
pub struct ResumeMapper(Arc<dyn Fn(&ResumeContext) -> ResumeParams + Send + Sync>);

impl ResumeMapper {
    /// Wraps a mapping function.
    pub fn new<F>(mapper: F) -> Self
    where
        F: Fn(&ResumeContext) -> ResumeParams + Send + Sync + 'static,
    {
        Self(Arc::new(mapper))
    }

    /// Applies the mapping.
    #[must_use]
    pub fn map(&self, context: &ResumeContext) -> ResumeParams {
        (self.0)(context)
    }
}

impl Default for ResumeMapper {
    /// Passes `session_id`, `request_id` and `last_sequence` as query
    /// parameters when known.
    fn default() -> Self {
        Self::new(|context| {
            let mut params = ResumeParams::default();
            if let Some(session_id) = &context.session_id {
                params.query.insert("session_id".into(), session_id.clone());
            }
            if let Some(request_id) = &context.request_id {
                params.query.insert("request_id".into(), request_id.clone());
            }
            if let Some(sequence) = context.last_sequence {
                params.query.insert("last_sequence".into(), sequence.to_string());
            }
            params
        })
    }
}

impl fmt::Debug for ResumeMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResumeMapper(..)")
    }
}

// ============================================================================
// CredentialRefresher
// ============================================================================

/// Fetches fresh credentials before a reconnection attempt.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Returns the credentials for the next handshake of `session_id`.
    async fn refresh(&self, session_id: SessionId) -> Result<Credentials>;
}

// ============================================================================
// ReconnectConfig
// ============================================================================

/// Reconnection parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts before `reconnect_failed`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Scale delays by a random factor in `[0.5, 1.0]`.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    /// Resume context to handshake mapping.
    #[serde(skip)]
    pub resume: ResumeMapper,
    /// Optional credential source consulted before each attempt.
    #[serde(skip)]
    pub refresher: Option<Arc<dyn CredentialRefresher>>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter() -> bool {
    true
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
            resume: ResumeMapper::default(),
            refresher: None,
        }
    }
}

impl ReconnectConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the resume mapping.
    #[must_use]
    pub fn with_resume<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&ResumeContext) -> ResumeParams + Send + Sync + 'static,
    {
        self.resume = ResumeMapper::new(mapper);
        self
    }

    /// Sets the credential source.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }
}

impl fmt::Debug for ReconnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("jitter", &self.jitter)
            .field("refresher", &self.refresher.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Returns the delay before 0-based `attempt`, without jitter.
#[must_use]
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let exponential = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(63));
    Duration::from_millis(exponential.min(config.max_delay_ms))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn jittered(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(JITTER_MIN..=JITTER_MAX);
    Duration::from_millis((delay.as_millis() as f64 * factor).round() as u64)
}

// ============================================================================
// ReconnectionPolicy
// ============================================================================

#[derive(Default)]
struct PolicyState {
    attempts: u32,
    timer: Option<TimerId>,
    resume: ResumeContext,
    released: bool,
}

struct PolicyInner {
    config: ReconnectConfig,
    timer: Arc<dyn Timer>,
    state: Mutex<PolicyState>,
}

/// Reconnects after abnormal closure with bounded exponential backoff.
#[derive(Clone)]
pub struct ReconnectionPolicy {
    inner: Arc<PolicyInner>,
}

impl ReconnectionPolicy {
    /// Creates a policy that schedules attempts on `timer`.
    #[must_use]
    pub fn new(config: ReconnectConfig, timer: Arc<dyn Timer>) -> Self {
        Self {
            inner: Arc::new(PolicyInner {
                config,
                timer,
                state: Mutex::new(PolicyState::default()),
            }),
        }
    }

    /// Returns attempts made since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.inner.state.lock().attempts
    }

    /// Returns `true` while an attempt is scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Returns the resume context collected so far.
    #[must_use]
    pub fn resume_context(&self) -> ResumeContext {
        self.inner.state.lock().resume.clone()
    }

    fn on_close(&self, session: &LiveSession, code: u16, out: &mut Vec<SessionEvent>) {
        if code == NORMAL_CLOSURE || session.is_close_requested() {
            trace!(session_id = %session.id(), code, "Close does not need recovery");
            return;
        }

        let config = &self.inner.config;
        let mut state = self.inner.state.lock();

        if state.released {
            return;
        }
        if state.timer.is_some() {
            trace!(session_id = %session.id(), "Reconnection already scheduled");
            return;
        }

        if state.attempts >= config.max_attempts {
            warn!(
                session_id = %session.id(),
                attempts = state.attempts,
                "Reconnection attempts exhausted"
            );
            out.push(SessionEvent::ReconnectFailed {
                attempts: state.attempts,
            });
            state.attempts = 0;
            return;
        }

        let base = backoff_delay(config, state.attempts);
        let delay = if config.jitter { jittered(base) } else { base };
        state.attempts += 1;
        let attempt = state.attempts;

        info!(
            session_id = %session.id(),
            code,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection"
        );

        let policy = Arc::downgrade(&self.inner);
        let target = session.downgrade();
        let generation = session.generation();
        state.timer = Some(
            self.inner
                .timer
                .schedule(delay, Box::new(move || fire(&policy, &target, generation))),
        );

        out.push(SessionEvent::Reconnecting { attempt, delay });
    }
}

fn fire(policy: &Weak<PolicyInner>, target: &WeakSession, generation: u64) {
    let (Some(policy), Some(session)) = (policy.upgrade(), target.upgrade()) else {
        return;
    };

    let options = {
        let mut state = policy.state.lock();
        state.timer = None;
        if state.released || session.is_close_requested() || session.generation() != generation {
            debug!(session_id = %session.id(), "Reconnection no longer wanted");
            return;
        }
        policy.config.resume.map(&state.resume).into_options()
    };

    match (policy.config.refresher.clone(), tokio::runtime::Handle::try_current()) {
        (Some(refresher), Ok(runtime)) => {
            runtime.spawn(async move {
                match refresher.refresh(session.id()).await {
                    Ok(credentials) => session.set_credentials(credentials),
                    Err(e) => {
                        warn!(session_id = %session.id(), error = %e, "Credential refresh failed");
                        session.dispatch(SessionEvent::Warning {
                            message: e.to_string(),
                        });
                    }
                }
                attempt_reconnect(&session, options, generation);
            });
        }
        _ => attempt_reconnect(&session, options, generation),
    }
}

fn attempt_reconnect(session: &LiveSession, options: LiveOptions, generation: u64) {
    // The user may have closed or connected while credentials refreshed.
    if session.is_close_requested() || session.generation() != generation {
        debug!(session_id = %session.id(), "Session moved on, reconnection skipped");
        return;
    }

    // Failures arrive as `error` and `close` events, which drive the next attempt.
    if let Err(e) = session.reconnect(options) {
        debug!(session_id = %session.id(), error = %e, "Reconnection attempt failed");
    }
}

impl Behavior for ReconnectionPolicy {
    fn name(&self) -> &'static str {
        "reconnection"
    }

    fn observe(&self, session: &LiveSession, event: &SessionEvent, out: &mut Vec<SessionEvent>) {
        match event {
            SessionEvent::Close { code, .. } => self.on_close(session, *code, out),

            SessionEvent::Open => {
                let mut state = self.inner.state.lock();
                if state.attempts > 0 {
                    info!(session_id = %session.id(), attempts = state.attempts, "Reconnected");
                    out.push(SessionEvent::Reconnected {
                        attempts: state.attempts,
                    });
                    state.attempts = 0;
                }
            }

            SessionEvent::Control(control) => {
                if let Some(context) = ResumeContext::from_metadata(control) {
                    trace!(session_id = %session.id(), "Resume context updated");
                    self.inner.state.lock().resume.merge(context);
                }
            }

            _ => {}
        }
    }

    fn enrich(&self, ctx: &mut MiddlewareContext) {
        let state = self.inner.state.lock();
        ctx.connection_attempt = state.attempts;
        if !state.resume.is_empty() {
            ctx.resume = Some(state.resume.clone());
        }
    }

    fn on_close_requested(&self) {
        let mut state = self.inner.state.lock();
        state.attempts = 0;
        if let Some(id) = state.timer.take() {
            debug!("Pending reconnection cancelled by close");
            self.inner.timer.cancel(id);
        }
    }

    fn on_release(&self) {
        let mut state = self.inner.state.lock();
        state.released = true;
        state.attempts = 0;
        state.resume = ResumeContext::default();
        if let Some(id) = state.timer.take() {
            self.inner.timer.cancel(id);
        }
    }
}

impl fmt::Debug for ReconnectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectionPolicy")
            .field("config", &self.inner.config)
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
