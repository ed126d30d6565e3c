//! Middleware trait and registration entries.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::SessionEvent;

use super::context::MiddlewareContext;

// ============================================================================
// Middleware
// ============================================================================

/// Observes events before and after user handlers see them.
///
/// Middleware runs on a background worker. It can enrich the context for
/// later middleware, but it cannot delay or filter delivery to handlers.
/// Errors and panics are caught per invocation and reported as
/// `middleware_error` events.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Runs before the event's user handlers.
    async fn before(&self, _event: &SessionEvent, _ctx: &mut MiddlewareContext) -> Result<()> {
        Ok(())
    }

    /// Runs after the `before` chain for the same event.
    async fn after(&self, _event: &SessionEvent, _ctx: &mut MiddlewareContext) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// FnMiddleware
// ============================================================================

type SyncHook = Box<dyn Fn(&SessionEvent, &mut MiddlewareContext) -> Result<()> + Send + Sync>;

/// Middleware built from plain closures.
///
/// # Example
///
/// ```ignore
/// let mw = FnMiddleware::new()
///     .with_before(|event, ctx| {
///         ctx.set_extension("seen", event.name());
///         Ok(())
///     });
/// ```
#[derive(Default)]
pub struct FnMiddleware {
    before: Option<SyncHook>,
    after: Option<SyncHook>,
}

impl FnMiddleware {
    /// Creates middleware that does nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `before` hook.
    #[must_use]
    pub fn with_before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SessionEvent, &mut MiddlewareContext) -> Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Sets the `after` hook.
    #[must_use]
    pub fn with_after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SessionEvent, &mut MiddlewareContext) -> Result<()> + Send + Sync + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl Middleware for FnMiddleware {
    async fn before(&self, event: &SessionEvent, ctx: &mut MiddlewareContext) -> Result<()> {
        match &self.before {
            Some(hook) => hook(event, ctx),
            None => Ok(()),
        }
    }

    async fn after(&self, event: &SessionEvent, ctx: &mut MiddlewareContext) -> Result<()> {
        match &self.after {
            Some(hook) => hook(event, ctx),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FnMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

// ============================================================================
// MiddlewareScope
// ============================================================================

/// Where an entry was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewareScope {
    /// Every session of a namespace and version.
    Global,
    /// One session.
    Instance,
}

// ============================================================================
// MiddlewareEntry
// ============================================================================

/// A middleware bound to an event filter.
#[derive(Clone)]
pub struct MiddlewareEntry {
    event: Option<String>,
    scope: MiddlewareScope,
    handler: Arc<dyn Middleware>,
}

impl MiddlewareEntry {
    /// Runs `middleware` for events named `event`.
    #[must_use]
    pub fn new(event: impl Into<String>, middleware: impl Middleware + 'static) -> Self {
        Self::from_arc(Some(event.into()), Arc::new(middleware))
    }

    /// Runs `middleware` for every event.
    #[must_use]
    pub fn any(middleware: impl Middleware + 'static) -> Self {
        Self::from_arc(None, Arc::new(middleware))
    }

    /// Wraps shared middleware. `None` matches every event.
    #[must_use]
    pub fn from_arc(event: Option<String>, middleware: Arc<dyn Middleware>) -> Self {
        Self {
            event,
            scope: MiddlewareScope::Global,
            handler: middleware,
        }
    }

    /// Returns the event filter. `None` matches every event.
    #[inline]
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Returns the registration scope.
    #[inline]
    #[must_use]
    pub fn scope(&self) -> MiddlewareScope {
        self.scope
    }

    /// Returns `true` if this entry runs for `event`.
    #[inline]
    #[must_use]
    pub fn matches(&self, event: &str) -> bool {
        self.event.as_deref().is_none_or(|name| name == event)
    }

    pub(crate) fn handler(&self) -> &Arc<dyn Middleware> {
        &self.handler
    }

    pub(crate) fn scoped(mut self, scope: MiddlewareScope) -> Self {
        self.scope = scope;
        self
    }
}

impl fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("event", &self.event)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
