//! Error types for speechwire.
//!
//! This module defines all error types used throughout the crate.
//!
//! Errors are returned from imperative calls (building a client, opening a
//! socket, registering a supervisor). Inside the live event path they are
//! never thrown: transport, framing, handler and middleware failures are
//! converted into [`SessionEvent`](crate::SessionEvent)s instead.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::NotOpen`] |
//! | Protocol | [`Error::Protocol`] |
//! | Session | [`Error::AlreadySupervised`], [`Error::Released`] |
//! | Extension | [`Error::Handler`], [`Error::Middleware`], [`Error::Credentials`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Url`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::SessionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client or supervisor configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Socket could not be created or the handshake failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Socket was closed while an operation needed it.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation requires an open socket.
    #[error("Session {session_id} is not open")]
    NotOpen {
        /// Session the operation targeted.
        session_id: SessionId,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session already has a supervisor attached.
    #[error("Session {session_id} is already supervised")]
    AlreadySupervised {
        /// The supervised session.
        session_id: SessionId,
    },

    /// The supervisor released its resources and cannot be used again.
    #[error("Session {session_id} was released")]
    Released {
        /// The released session.
        session_id: SessionId,
    },

    // ========================================================================
    // Extension Errors
    // ========================================================================
    /// A user event handler failed.
    #[error("Handler error: {message}")]
    Handler {
        /// Description of the failure.
        message: String,
    },

    /// A middleware function failed.
    #[error("Middleware error: {message}")]
    Middleware {
        /// Description of the failure.
        message: String,
    },

    /// Refreshing credentials before a reconnect failed.
    #[error("Credential refresh failed: {message}")]
    Credentials {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a not-open error.
    #[inline]
    pub fn not_open(session_id: SessionId) -> Self {
        Self::NotOpen { session_id }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an already-supervised error.
    #[inline]
    pub fn already_supervised(session_id: SessionId) -> Self {
        Self::AlreadySupervised { session_id }
    }

    /// Creates a released error.
    #[inline]
    pub fn released(session_id: SessionId) -> Self {
        Self::Released { session_id }
    }

    /// Creates a handler error.
    #[inline]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Creates a middleware error.
    #[inline]
    pub fn middleware(message: impl Into<String>) -> Self {
        Self::Middleware {
            message: message.into(),
        }
    }

    /// Creates a credential refresh error.
    #[inline]
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::NotOpen { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed once the socket is reopened.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::NotOpen { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("handshake refused");
        assert_eq!(err.to_string(), "Connection failed: handshake refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing base url");
        assert_eq!(err.to_string(), "Configuration error: missing base url");
    }

    #[test]
    fn test_not_open_mentions_session() {
        let id = SessionId::generate();
        let err = Error::not_open(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::middleware("boom").is_recoverable());
        assert!(!Error::released(SessionId::generate()).is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
