//! Session events.
//!
//! Everything a live session reports to user code is a [`SessionEvent`].
//! Each variant has a stable event name used as the key for handlers and
//! middleware.
//!
//! # Event Names
//!
//! | Name | Variant | Origin |
//! |------|---------|--------|
//! | `open` | [`SessionEvent::Open`] | socket |
//! | `close` | [`SessionEvent::Close`] | socket |
//! | `error` | [`SessionEvent::Error`] | transport failure |
//! | `warning` | [`SessionEvent::Warning`] | dropped frame or send |
//! | wire `type` (`Results`, `Metadata`, …) | [`SessionEvent::Control`] | server |
//! | `Audio` | [`SessionEvent::Audio`] | server binary frame |
//! | `Unhandled` | [`SessionEvent::Unparsed`], unknown control types | server |
//! | `middleware_error` | [`SessionEvent::MiddlewareError`] | handler or middleware |
//! | `reconnecting` / `reconnected` / `reconnect_failed` | reconnection policy | supervisor |
//! | `turn_started` | [`SessionEvent::TurnStarted`] | turn counter |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::message::ControlMessage;

// ============================================================================
// Event Names
// ============================================================================

/// Event name constants.
pub mod names {
    /// Socket opened.
    pub const OPEN: &str = "open";
    /// Socket closed.
    pub const CLOSE: &str = "close";
    /// Transport failure.
    pub const ERROR: &str = "error";
    /// Local warning.
    pub const WARNING: &str = "warning";
    /// Binary payload from the server.
    pub const AUDIO: &str = "Audio";
    /// Unknown control type or unparseable text.
    pub const UNHANDLED: &str = "Unhandled";
    /// Server metadata.
    pub const METADATA: &str = "Metadata";
    /// Handler or middleware failure.
    pub const MIDDLEWARE_ERROR: &str = "middleware_error";
    /// Reconnection scheduled.
    pub const RECONNECTING: &str = "reconnecting";
    /// Reconnection succeeded.
    pub const RECONNECTED: &str = "reconnected";
    /// Reconnection attempts exhausted.
    pub const RECONNECT_FAILED: &str = "reconnect_failed";
    /// New conversational turn.
    pub const TURN_STARTED: &str = "turn_started";
}

// ============================================================================
// TransportError
// ============================================================================

/// Diagnostic context for a socket-level failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    /// Human-readable description.
    pub message: String,
    /// HTTP status of a rejected handshake.
    pub status: Option<u16>,
    /// Server request ID, if the server assigned one.
    pub request_id: Option<String>,
    /// Raw ready-state at the time of failure.
    pub ready_state: Option<u8>,
    /// URL of the socket.
    pub url: Option<String>,
}

impl TransportError {
    /// Creates an error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the ready-state.
    #[must_use]
    pub fn with_ready_state(mut self, ready_state: u8) -> Self {
        self.ready_state = Some(ready_state);
        self
    }

    /// Sets the URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " [request {request_id}]")?;
        }
        Ok(())
    }
}

// ============================================================================
// Speaker
// ============================================================================

/// Party holding the floor in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human user.
    User,
    /// The voice agent.
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

// ============================================================================
// FailureSource
// ============================================================================

/// Which extension point failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureSource {
    /// A user handler registered with `on`.
    Handler,
    /// A middleware `before` function.
    Before,
    /// A middleware `after` function.
    After,
}

impl fmt::Display for FailureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler => f.write_str("handler"),
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

// ============================================================================
// SessionEvent
// ============================================================================

/// An event delivered to handlers and middleware.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Socket opened.
    Open,

    /// Socket closed.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Transport failure.
    Error(TransportError),

    /// Something was dropped instead of sent or delivered.
    Warning {
        /// What was dropped and why.
        message: String,
    },

    /// Server control message.
    Control(ControlMessage),

    /// Server binary payload.
    Audio(Bytes),

    /// Text frame that could not be parsed, verbatim.
    Unparsed {
        /// Original text.
        raw: String,
    },

    /// A handler or middleware failed.
    MiddlewareError {
        /// Failing extension point.
        source: FailureSource,
        /// Name of the event being processed.
        event: String,
        /// Failure description.
        message: String,
    },

    /// A reconnection attempt was scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },

    /// The session reopened after one or more attempts.
    Reconnected {
        /// Attempts it took.
        attempts: u32,
    },

    /// Reconnection gave up.
    ReconnectFailed {
        /// Attempts made.
        attempts: u32,
    },

    /// A new conversational turn began.
    TurnStarted {
        /// 1-based turn number.
        turn: u32,
        /// Who holds the floor.
        speaker: Speaker,
    },
}

impl SessionEvent {
    /// Returns the event name handlers and middleware are keyed by.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Open => names::OPEN,
            Self::Close { .. } => names::CLOSE,
            Self::Error(_) => names::ERROR,
            Self::Warning { .. } => names::WARNING,
            Self::Control(control) => control.kind.as_str(),
            Self::Audio(_) => names::AUDIO,
            Self::Unparsed { .. } => names::UNHANDLED,
            Self::MiddlewareError { .. } => names::MIDDLEWARE_ERROR,
            Self::Reconnecting { .. } => names::RECONNECTING,
            Self::Reconnected { .. } => names::RECONNECTED,
            Self::ReconnectFailed { .. } => names::RECONNECT_FAILED,
            Self::TurnStarted { .. } => names::TURN_STARTED,
        }
    }

    /// Returns the control message, if this is one.
    #[inline]
    #[must_use]
    pub fn as_control(&self) -> Option<&ControlMessage> {
        match self {
            Self::Control(control) => Some(control),
            _ => None,
        }
    }

    /// Returns the binary payload, if this is one.
    #[inline]
    #[must_use]
    pub fn as_audio(&self) -> Option<&Bytes> {
        match self {
            Self::Audio(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns `true` for a close with a code other than normal closure.
    #[inline]
    #[must_use]
    pub fn is_abnormal_close(&self) -> bool {
        matches!(self, Self::Close { code, .. } if *code != crate::transport::NORMAL_CLOSURE)
    }
}

// ============================================================================
// Tests
// ============================================================================
