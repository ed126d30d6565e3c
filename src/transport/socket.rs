//! Duplex socket collaborator.
//!
//! The session never talks to a concrete WebSocket. It asks a
//! [`SocketFactory`] for a [`DuplexSocket`] and hands the factory a
//! [`SocketEvents`] reporter at the same moment. The reporter is moved into
//! `open` by value and cannot be cloned, so a socket instance has exactly
//! one set of open/close/error/message callbacks, wired once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::protocol::TransportError;

// ============================================================================
// Constants
// ============================================================================

/// Raw ready-state: handshake in progress.
pub const READY_STATE_CONNECTING: u8 = 0;

/// Raw ready-state: open.
pub const READY_STATE_OPEN: u8 = 1;

/// Raw ready-state: close handshake in progress.
pub const READY_STATE_CLOSING: u8 = 2;

/// Raw ready-state: closed.
pub const READY_STATE_CLOSED: u8 = 3;

/// Close code for an intentional, clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

// ============================================================================
// Frame
// ============================================================================

/// An inbound frame as delivered by the socket.
///
/// Binary data may arrive in three container shapes. The classifier
/// normalizes all of them to [`Bytes`].
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Raw byte buffer.
    Binary(Bytes),
    /// Fixed, shared byte array.
    Fixed(Arc<[u8]>),
    /// Deferred read that yields the bytes later.
    Deferred(BoxFuture<'static, io::Result<Bytes>>),
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
            Self::Fixed(bytes) => f.debug_tuple("Fixed").field(&bytes.len()).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

// ============================================================================
// OutboundFrame
// ============================================================================

/// A frame handed to the socket's send primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl OutboundFrame {
    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// RawSocketEvent
// ============================================================================

/// Lifecycle and data events reported by a socket.
#[derive(Debug)]
pub enum RawSocketEvent {
    /// Handshake completed.
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
    /// Inbound frame.
    Message(Frame),
}

/// Generation-tagged raw event, as queued for the session pump.
pub(crate) type TaggedEvent = (u64, RawSocketEvent);

// ============================================================================
// SocketEvents
// ============================================================================

/// The one-and-only event reporter for a socket instance.
///
/// Events are tagged with the socket's generation so the session can ignore
/// anything a retired socket still reports.
pub struct SocketEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl SocketEvents {
    /// Creates a reporter for one socket generation.
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Returns the generation this reporter is bound to.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports that the handshake completed.
    pub fn opened(&self) {
        self.report(RawSocketEvent::Open);
    }

    /// Reports that the socket closed.
    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        self.report(RawSocketEvent::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Reports a transport failure.
    pub fn failed(&self, error: TransportError) {
        self.report(RawSocketEvent::Error(error));
    }

    /// Reports an inbound frame.
    pub fn message(&self, frame: Frame) {
        self.report(RawSocketEvent::Message(frame));
    }

    fn report(&self, event: RawSocketEvent) {
        // Receiver is gone once the session is dropped.
        let _ = self.tx.send((self.generation, event));
    }
}

impl fmt::Debug for SocketEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEvents")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SocketRequest
// ============================================================================

/// Everything a factory needs to open a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRequest {
    /// Fully built URL including query parameters.
    pub url: Url,
    /// Handshake headers.
    pub headers: Vec<(String, String)>,
}

impl SocketRequest {
    /// Returns the value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A live duplex socket.
pub trait DuplexSocket: Send + Sync {
    /// Queues a frame for sending.
    fn send(&self, frame: OutboundFrame);

    /// Starts the close handshake.
    fn close(&self, code: u16, reason: &str);

    /// Returns the raw ready-state (0..=3).
    fn ready_state(&self) -> u8;
}

/// Creates sockets.
pub trait SocketFactory: Send + Sync {
    /// Creates a socket for `request`, reporting through `events`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the socket could not be created at all.
    /// Handshake failures happen later and are reported via `events`.
    fn open(&self, request: SocketRequest, events: SocketEvents) -> Result<Box<dyn DuplexSocket>>;
}

// ============================================================================
// Tests
// ============================================================================
