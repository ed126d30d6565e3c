//! Middleware registry.
//!
//! One explicit registry object is shared by every session that should see
//! the same global middleware. Global entries are keyed by namespace and
//! version, instance entries by session ID.
//!
//! # Ordering
//!
//! For one event, [`MiddlewareRegistry::middlewares`] returns matching global
//! entries followed by matching instance entries, each in registration order.
//! Callers receive a snapshot, so registrations made while a chain is running
//! only affect later events.

// ============================================================================
// Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::identifiers::SessionId;
use crate::protocol::{FailureSource, Namespace, ProtocolVersion, SessionEvent};
use crate::session::handlers::panic_message;

use super::context::MiddlewareContext;
use super::entry::{MiddlewareEntry, MiddlewareScope};

// ============================================================================
// MiddlewareFailure
// ============================================================================

/// One failed middleware invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareFailure {
    /// `before` or `after`.
    pub phase: FailureSource,
    /// Name of the event being processed.
    pub event: String,
    /// Error or panic message.
    pub message: String,
}

impl MiddlewareFailure {
    /// Converts into the event reported to user handlers.
    #[must_use]
    pub fn into_event(self) -> SessionEvent {
        SessionEvent::MiddlewareError {
            source: self.phase,
            event: self.event,
            message: self.message,
        }
    }
}

// ============================================================================
// MiddlewareRegistry
// ============================================================================

/// Global and per-session middleware.
#[derive(Default)]
pub struct MiddlewareRegistry {
    global: RwLock<FxHashMap<(Namespace, ProtocolVersion), Vec<MiddlewareEntry>>>,
    instance: RwLock<FxHashMap<SessionId, Vec<MiddlewareEntry>>>,
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry ready to share.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers middleware for every session of `namespace` at `version`.
    pub fn use_global(&self, namespace: Namespace, version: ProtocolVersion, entry: MiddlewareEntry) {
        debug!(%namespace, %version, event = ?entry.event(), "Global middleware registered");
        self.global
            .write()
            .entry((namespace, version))
            .or_default()
            .push(entry.scoped(MiddlewareScope::Global));
    }

    /// Registers middleware for one session.
    pub fn add_instance(&self, session_id: SessionId, entry: MiddlewareEntry) {
        debug!(%session_id, event = ?entry.event(), "Instance middleware registered");
        self.instance
            .write()
            .entry(session_id)
            .or_default()
            .push(entry.scoped(MiddlewareScope::Instance));
    }

    /// Returns the entries that run for `event`, global first.
    #[must_use]
    pub fn middlewares(
        &self,
        namespace: Namespace,
        version: ProtocolVersion,
        session_id: SessionId,
        event: &str,
    ) -> Vec<MiddlewareEntry> {
        let mut entries: Vec<MiddlewareEntry> = self
            .global
            .read()
            .get(&(namespace, version))
            .map(|list| list.iter().filter(|e| e.matches(event)).cloned().collect())
            .unwrap_or_default();

        if let Some(list) = self.instance.read().get(&session_id) {
            entries.extend(list.iter().filter(|e| e.matches(event)).cloned());
        }

        entries
    }

    /// Removes every instance entry of `session_id`. Global entries stay.
    ///
    /// Returns the number of entries removed.
    pub fn dispose(&self, session_id: SessionId) -> usize {
        let removed = self
            .instance
            .write()
            .remove(&session_id)
            .map_or(0, |list| list.len());
        debug!(%session_id, removed, "Instance middleware disposed");
        removed
    }

    /// Returns the number of instance entries for `session_id`.
    #[must_use]
    pub fn instance_count(&self, session_id: SessionId) -> usize {
        self.instance.read().get(&session_id).map_or(0, Vec::len)
    }

    /// Returns the number of global entries for `namespace` at `version`.
    #[must_use]
    pub fn global_count(&self, namespace: Namespace, version: ProtocolVersion) -> usize {
        self.global
            .read()
            .get(&(namespace, version))
            .map_or(0, Vec::len)
    }

    /// Runs every entry's `before`, one at a time, in order.
    ///
    /// Failures are collected and never stop the chain.
    pub async fn execute_before(
        entries: &[MiddlewareEntry],
        event: &SessionEvent,
        ctx: &mut MiddlewareContext,
    ) -> Vec<MiddlewareFailure> {
        Self::execute(FailureSource::Before, entries, event, ctx).await
    }

    /// Runs every entry's `after`, one at a time, in order.
    ///
    /// Failures are collected and never stop the chain.
    pub async fn execute_after(
        entries: &[MiddlewareEntry],
        event: &SessionEvent,
        ctx: &mut MiddlewareContext,
    ) -> Vec<MiddlewareFailure> {
        Self::execute(FailureSource::After, entries, event, ctx).await
    }

    async fn execute(
        phase: FailureSource,
        entries: &[MiddlewareEntry],
        event: &SessionEvent,
        ctx: &mut MiddlewareContext,
    ) -> Vec<MiddlewareFailure> {
        let mut failures = Vec::new();

        for entry in entries {
            let handler = Arc::clone(entry.handler());
            let outcome = match phase {
                FailureSource::After => {
                    AssertUnwindSafe(handler.after(event, ctx)).catch_unwind().await
                }
                FailureSource::Before | FailureSource::Handler => {
                    AssertUnwindSafe(handler.before(event, ctx)).catch_unwind().await
                }
            };

            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("Middleware panicked: {}", panic_message(payload.as_ref())),
            };

            warn!(
                session_id = %ctx.session_id,
                event = event.name(),
                phase = %phase,
                error = %message,
                "Middleware failed"
            );
            failures.push(MiddlewareFailure {
                phase,
                event: event.name().to_string(),
                message,
            });
        }

        failures
    }
}

// ============================================================================
// Tests
// ============================================================================
