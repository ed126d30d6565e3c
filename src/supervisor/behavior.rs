//! Pluggable supervisor behaviors.

// ============================================================================
// Imports
// ============================================================================

use crate::middleware::MiddlewareContext;
use crate::protocol::SessionEvent;
use crate::session::LiveSession;

// ============================================================================
// Behavior
// ============================================================================

/// Session-local state machine attached to a supervisor.
///
/// For every event, in this order, the supervisor calls `observe` on each
/// behavior, builds the middleware context with `enrich`, delivers the event,
/// then dispatches any follow-up events the behaviors produced. Follow-ups go
/// through the same path, so behaviors see each other's events.
///
/// Implementations keep their state behind their own lock. They must not
/// call back into the supervisor from `observe` while holding it.
pub trait Behavior: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Updates state from `event` and pushes follow-up events onto `out`.
    fn observe(&self, session: &LiveSession, event: &SessionEvent, out: &mut Vec<SessionEvent>);

    /// Copies behavior state into the context of the event being emitted.
    fn enrich(&self, _ctx: &mut MiddlewareContext) {}

    /// Drops scheduled work after the user closed the session.
    fn on_close_requested(&self) {}

    /// Releases timers and state. Called once, on the first supervisor close.
    fn on_release(&self) {}
}
