//! Per-event middleware context.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::identifiers::SessionId;
use crate::protocol::{Namespace, ProtocolVersion};
use crate::session::ResumeContext;

// ============================================================================
// MiddlewareContext
// ============================================================================

/// Context handed to every middleware invocation for one event.
///
/// Created fresh per event. The `before` and `after` chains of one event
/// share the same context, so a global `before` can set a field that an
/// instance `after` reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddlewareContext {
    /// Session that emitted the event.
    pub session_id: SessionId,
    /// Protocol family.
    pub namespace: Namespace,
    /// Protocol version.
    pub version: ProtocolVersion,
    /// Conversational turns so far.
    pub turn_count: u32,
    /// Reconnection attempts since the last successful open.
    pub connection_attempt: u32,
    /// Payload of the last `Metadata` message seen.
    pub metadata: Option<Value>,
    /// Resumption identifiers.
    pub resume: Option<ResumeContext>,
    /// Free-form fields for middleware to share.
    pub extensions: Map<String, Value>,
}

impl MiddlewareContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new(session_id: SessionId, namespace: Namespace, version: ProtocolVersion) -> Self {
        Self {
            session_id,
            namespace,
            version,
            turn_count: 0,
            connection_attempt: 0,
            metadata: None,
            resume: None,
            extensions: Map::new(),
        }
    }

    /// Returns an extension field.
    #[inline]
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// Sets an extension field.
    pub fn set_extension(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extensions.insert(key.into(), value.into());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_extensions() {
        let mut ctx = MiddlewareContext::new(SessionId::generate(), Namespace::Agent, ProtocolVersion::V1);
        assert!(ctx.extension("trace").is_none());

        ctx.set_extension("trace", "abc");
        assert_eq!(ctx.extension("trace"), Some(&json!("abc")));
        assert_eq!(ctx.turn_count, 0);
    }
}
