//! Supervised session.
//!
//! A [`Supervisor`] wraps a [`LiveSession`] by composition. It installs
//! itself as the session's emission tap, so every event the session produces
//! passes through [`SupervisorCore::on_emit`] first.
//!
//! # Emission Pipeline
//!
//! ```text
//! socket ──► session pump ──► on_emit
//!                              │ 1. behaviors observe (follow-ups collected)
//!                              │ 2. last metadata updated
//!                              │ 3. context built, behaviors enrich
//!                              │ 4. job queued ───────────► worker task
//!                              │ 5. user handlers                │ before chain
//!                              │ 6. follow-ups, same path        │ after chain
//!                              ▼                                 ▼
//!                           returns                   middleware_error events
//! ```
//!
//! Steps 1 to 6 never wait on middleware. The worker runs jobs in order, one
//! at a time, so `before` and `after` of one event never interleave with
//! those of another.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, SessionId};
use crate::middleware::{MiddlewareContext, MiddlewareEntry, MiddlewareRegistry, MiddlewareScope};
use crate::protocol::{ControlKind, Namespace, Outbound, ProtocolVersion, SessionEvent};
use crate::session::{
    ConnectionState, EmitTap, LiveConnection, LiveOptions, LiveSession, WeakSession,
};
use crate::transport::NORMAL_CLOSURE;

use super::behavior::Behavior;
use super::builder::SupervisorBuilder;
use super::reconnect::ReconnectionPolicy;
use super::turns::TurnCounter;

// ============================================================================
// Job
// ============================================================================

/// Work for the middleware worker.
pub(crate) enum Job {
    /// Run both chains for one event.
    Event {
        event: SessionEvent,
        ctx: MiddlewareContext,
        entries: Vec<MiddlewareEntry>,
    },
    /// Remove the session's instance middleware.
    Dispose,
}

// ============================================================================
// SupervisorCore
// ============================================================================

/// Shared state of a supervisor. Installed as the session's tap.
pub(crate) struct SupervisorCore {
    pub(crate) session: LiveSession,
    pub(crate) registry: Arc<MiddlewareRegistry>,
    pub(crate) behaviors: Vec<Arc<dyn Behavior>>,
    pub(crate) reconnection: Option<ReconnectionPolicy>,
    pub(crate) turns: Option<Arc<TurnCounter>>,
    pub(crate) last_metadata: Mutex<Option<Value>>,
    pub(crate) jobs_tx: mpsc::UnboundedSender<Job>,
    /// Starts `true` and flips to `false` once the tap is installed.
    pub(crate) released: Arc<AtomicBool>,
}

impl SupervisorCore {
    fn context_for(&self, session: &LiveSession) -> MiddlewareContext {
        let mut ctx = MiddlewareContext::new(session.id(), session.namespace(), session.version());
        ctx.metadata = self.last_metadata.lock().clone();
        for behavior in &self.behaviors {
            behavior.enrich(&mut ctx);
        }
        ctx
    }

    /// Releases behaviors and queues disposal. Returns `false` if already
    /// released.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        for behavior in &self.behaviors {
            trace!(session_id = %self.session.id(), behavior = behavior.name(), "Releasing behavior");
            behavior.on_release();
        }
        *self.last_metadata.lock() = None;

        // Queued behind in-flight jobs so disposal never races them.
        if self.jobs_tx.send(Job::Dispose).is_err() {
            self.registry.dispose(self.session.id());
        }

        info!(session_id = %self.session.id(), "Supervisor released");
        true
    }
}

impl EmitTap for SupervisorCore {
    fn on_emit(&self, session: &LiveSession, event: SessionEvent) {
        if matches!(event, SessionEvent::MiddlewareError { .. }) {
            session.emit(&event);
            return;
        }

        let mut follow_ups = Vec::new();
        for behavior in &self.behaviors {
            behavior.observe(session, &event, &mut follow_ups);
        }

        if let Some(control) = event.as_control()
            && control.kind == ControlKind::Metadata
        {
            *self.last_metadata.lock() = Some(control.payload.clone());
        }

        let entries = self.registry.middlewares(
            session.namespace(),
            session.version(),
            session.id(),
            event.name(),
        );
        if !entries.is_empty() {
            let job = Job::Event {
                event: event.clone(),
                ctx: self.context_for(session),
                entries,
            };
            if self.jobs_tx.send(job).is_err() {
                warn!(session_id = %session.id(), event = event.name(), "Middleware worker gone");
            }
        }

        session.emit(&event);

        for follow_up in follow_ups {
            self.on_emit(session, follow_up);
        }
    }

    fn on_close_requested(&self, session: &LiveSession) {
        for behavior in &self.behaviors {
            trace!(session_id = %session.id(), behavior = behavior.name(), "Close requested");
            behavior.on_close_requested();
        }
    }
}

impl Drop for SupervisorCore {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            for behavior in &self.behaviors {
                behavior.on_release();
            }
            self.registry.dispose(self.session.id());
        }
    }
}

// ============================================================================
// Middleware Worker
// ============================================================================

pub(crate) async fn run_worker(
    session: WeakSession,
    session_id: SessionId,
    registry: Arc<MiddlewareRegistry>,
    released: Arc<AtomicBool>,
    mut jobs_rx: mpsc::UnboundedReceiver<Job>,
) {
    debug!(%session_id, "Middleware worker started");

    while let Some(job) = jobs_rx.recv().await {
        match job {
            Job::Event {
                event,
                mut ctx,
                entries,
            } => {
                let mut entries = entries;
                if released.load(Ordering::Acquire) {
                    entries.retain(|entry| entry.scope() == MiddlewareScope::Global);
                }

                let mut failures =
                    MiddlewareRegistry::execute_before(&entries, &event, &mut ctx).await;
                failures.extend(MiddlewareRegistry::execute_after(&entries, &event, &mut ctx).await);

                if failures.is_empty() {
                    continue;
                }
                let Some(session) = session.upgrade() else {
                    continue;
                };
                for failure in failures {
                    session.emit(&failure.into_event());
                }
            }

            Job::Dispose => {
                registry.dispose(session_id);
            }
        }
    }

    debug!(%session_id, "Middleware worker terminated");
}

// ============================================================================
// Supervisor
// ============================================================================

/// A live session with middleware and behaviors attached.
///
/// Handlers registered here, or on the wrapped session, receive events in
/// arrival order, unaffected by middleware latency or failures.
///
/// # Example
///
/// ```ignore
/// let supervisor = Supervisor::builder(session, registry)
///     .with_reconnection(ReconnectConfig::default())
///     .with_turn_counting(TurnConfig::default())
///     .build()?;
///
/// supervisor
///     .use_middleware(MiddlewareEntry::any(EventStats::new()))
///     .on("turn_started", |event| {
///         println!("{event:?}");
///         Ok(())
///     });
/// supervisor.connect(LiveOptions::new())?;
/// ```
#[derive(Clone)]
pub struct Supervisor {
    pub(crate) core: Arc<SupervisorCore>,
}

impl Supervisor {
    /// Starts building a supervisor for `session`.
    #[must_use]
    pub fn builder(session: LiveSession, registry: Arc<MiddlewareRegistry>) -> SupervisorBuilder {
        SupervisorBuilder::new(session, registry)
    }

    /// Returns the wrapped session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &LiveSession {
        &self.core.session
    }

    /// Returns the shared registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<MiddlewareRegistry> {
        &self.core.registry
    }

    /// Returns the reconnection policy, if enabled.
    #[must_use]
    pub fn reconnection(&self) -> Option<&ReconnectionPolicy> {
        self.core.reconnection.as_ref()
    }

    /// Returns the number of turns so far, if turn counting is enabled.
    #[must_use]
    pub fn turn_count(&self) -> Option<u32> {
        self.core.turns.as_ref().map(|turns| turns.turn_count())
    }

    /// Returns `true` after the first close.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.core.released.load(Ordering::Acquire)
    }

    /// Registers middleware for this session only.
    ///
    /// Ignored after release.
    pub fn use_middleware(&self, entry: MiddlewareEntry) -> &Self {
        if self.is_released() {
            warn!(session_id = %self.core.session.id(), "Middleware registered after release ignored");
            return self;
        }
        self.core.registry.add_instance(self.core.session.id(), entry);
        self
    }

    /// Registers a handler for events named `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(&SessionEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.core.session.on(event, handler);
        self
    }

    /// Connects the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Released`] after close, or any error of
    /// [`LiveSession::connect`].
    pub fn connect(&self, options: LiveOptions) -> Result<()> {
        self.ensure_active()?;
        self.core.session.connect(options)
    }

    /// Replaces the socket.
    ///
    /// # Errors
    ///
    /// See [`Supervisor::connect`].
    pub fn reconnect(&self, options: LiveOptions) -> Result<()> {
        self.ensure_active()?;
        self.core.session.reconnect(options)
    }

    /// Sends a payload. See [`LiveSession::send`].
    ///
    /// # Errors
    ///
    /// Returns an error if a control message cannot be serialized.
    pub fn send(&self, data: impl Into<Outbound>) -> Result<()> {
        self.core.session.send(data)
    }

    /// Releases supervisor resources and closes with normal closure.
    pub fn close(&self) {
        self.close_with(NORMAL_CLOSURE, "");
    }

    /// Releases supervisor resources and closes.
    ///
    /// Only the first call releases. Later calls only close.
    pub fn close_with(&self, code: u16, reason: &str) {
        self.core.release();
        self.core.session.close_with(code, reason);
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_released() {
            return Err(Error::released(self.core.session.id()));
        }
        Ok(())
    }
}

impl LiveConnection for Supervisor {
    fn id(&self) -> SessionId {
        self.core.session.id()
    }

    fn namespace(&self) -> Namespace {
        self.core.session.namespace()
    }

    fn version(&self) -> ProtocolVersion {
        self.core.session.version()
    }

    fn state(&self) -> ConnectionState {
        self.core.session.state()
    }

    fn connect(&self, options: LiveOptions) -> Result<()> {
        Supervisor::connect(self, options)
    }

    fn reconnect(&self, options: LiveOptions) -> Result<()> {
        Supervisor::reconnect(self, options)
    }

    fn send(&self, data: Outbound) -> Result<()> {
        Supervisor::send(self, data)
    }

    fn close_with(&self, code: u16, reason: &str) {
        Supervisor::close_with(self, code, reason);
    }

    fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.core.session.on(event, handler)
    }

    fn off(&self, id: HandlerId) -> bool {
        self.core.session.off(id)
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("session", &self.core.session)
            .field("behaviors", &self.core.behaviors.iter().map(|b| b.name()).collect::<Vec<_>>())
            .field("released", &self.is_released())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
