//! Resumption identifiers.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::protocol::{ControlKind, ControlMessage};

// ============================================================================
// ResumeContext
// ============================================================================

/// Identifiers that let a reconnect continue the server-side session.
///
/// Extracted from `Metadata` control messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeContext {
    /// Server session ID.
    pub session_id: Option<String>,
    /// Server request ID.
    pub request_id: Option<String>,
    /// Sequence number of the last message seen.
    pub last_sequence: Option<u64>,
}

impl ResumeContext {
    /// Extracts a context from a `Metadata` message.
    ///
    /// Returns `None` for other kinds and for metadata without any of the
    /// three identifiers.
    #[must_use]
    pub fn from_metadata(control: &ControlMessage) -> Option<Self> {
        if control.kind != ControlKind::Metadata {
            return None;
        }

        let context = Self {
            session_id: control.get_str("session_id").map(str::to_string),
            request_id: control.get_str("request_id").map(str::to_string),
            last_sequence: control.get_u64("sequence"),
        };

        (!context.is_empty()).then_some(context)
    }

    /// Folds in a newer context. Fields the newer one lacks are kept.
    pub fn merge(&mut self, newer: ResumeContext) {
        if newer.session_id.is_some() {
            self.session_id = newer.session_id;
        }
        if newer.request_id.is_some() {
            self.request_id = newer.request_id;
        }
        if newer.last_sequence.is_some() {
            self.last_sequence = newer.last_sequence;
        }
    }

    /// Returns `true` if no identifier is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.request_id.is_none() && self.last_sequence.is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================
