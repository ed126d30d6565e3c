//! Connection state tracking.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::transport::{READY_STATE_CLOSING, READY_STATE_CONNECTING, READY_STATE_OPEN};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a session's socket.
///
/// Always derived from the socket's raw ready-state, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Open and usable.
    Open,
    /// Close handshake in progress.
    Closing,
    /// Closed, or no socket at all.
    Closed,
}

impl ConnectionState {
    /// Maps a raw ready-state. Absent sockets and unknown values are
    /// [`ConnectionState::Closed`].
    #[must_use]
    pub const fn from_ready_state(ready_state: Option<u8>) -> Self {
        match ready_state {
            Some(READY_STATE_CONNECTING) => Self::Connecting,
            Some(READY_STATE_OPEN) => Self::Open,
            Some(READY_STATE_CLOSING) => Self::Closing,
            // READY_STATE_CLOSED and anything out of range.
            Some(_) | None => Self::Closed,
        }
    }

    /// Returns `true` for [`ConnectionState::Open`].
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` while a socket is connecting or open.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_table() {
        assert_eq!(ConnectionState::from_ready_state(Some(0)), ConnectionState::Connecting);
        assert_eq!(ConnectionState::from_ready_state(Some(1)), ConnectionState::Open);
        assert_eq!(ConnectionState::from_ready_state(Some(2)), ConnectionState::Closing);
        assert_eq!(ConnectionState::from_ready_state(Some(3)), ConnectionState::Closed);
    }

    #[test]
    fn test_absent_or_unknown_is_closed() {
        assert_eq!(ConnectionState::from_ready_state(None), ConnectionState::Closed);
        assert_eq!(ConnectionState::from_ready_state(Some(42)), ConnectionState::Closed);
    }

    #[test]
    fn test_predicates() {
        assert!(ConnectionState::Open.is_open());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Closing.is_active());
    }
}
