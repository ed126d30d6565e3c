//! Common surface of sessions and supervised sessions.

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;
use crate::identifiers::{HandlerId, SessionId};
use crate::protocol::{Namespace, Outbound, ProtocolVersion, SessionEvent};

use super::live::LiveSession;
use super::options::LiveOptions;
use super::state::ConnectionState;

// ============================================================================
// LiveConnection
// ============================================================================

/// Operations shared by [`LiveSession`] and
/// [`Supervisor`](crate::supervisor::Supervisor).
///
/// Code that only drives a connection can accept either through this trait.
pub trait LiveConnection: Send + Sync {
    /// Returns the session ID.
    fn id(&self) -> SessionId;

    /// Returns the protocol family.
    fn namespace(&self) -> Namespace;

    /// Returns the protocol version.
    fn version(&self) -> ProtocolVersion;

    /// Returns the connection state.
    fn state(&self) -> ConnectionState;

    /// Returns `true` if the socket is open.
    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Connects with `options`. No-op while connecting or open.
    ///
    /// # Errors
    ///
    /// Returns an error if a socket could not be created.
    fn connect(&self, options: LiveOptions) -> Result<()>;

    /// Replaces the socket, merging `options` into the current options.
    ///
    /// # Errors
    ///
    /// Returns an error if a socket could not be created.
    fn reconnect(&self, options: LiveOptions) -> Result<()>;

    /// Sends a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if a control message cannot be serialized.
    fn send(&self, data: Outbound) -> Result<()>;

    /// Closes with `code` and `reason`.
    fn close_with(&self, code: u16, reason: &str);

    /// Registers a handler for events named `event`.
    fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        Self: Sized,
        F: Fn(&SessionEvent) -> Result<()> + Send + Sync + 'static;

    /// Removes a handler.
    fn off(&self, id: HandlerId) -> bool;
}

impl LiveConnection for LiveSession {
    fn id(&self) -> SessionId {
        LiveSession::id(self)
    }

    fn namespace(&self) -> Namespace {
        LiveSession::namespace(self)
    }

    fn version(&self) -> ProtocolVersion {
        LiveSession::version(self)
    }

    fn state(&self) -> ConnectionState {
        LiveSession::state(self)
    }

    fn connect(&self, options: LiveOptions) -> Result<()> {
        LiveSession::connect(self, options)
    }

    fn reconnect(&self, options: LiveOptions) -> Result<()> {
        LiveSession::reconnect(self, options)
    }

    fn send(&self, data: Outbound) -> Result<()> {
        LiveSession::send(self, data)
    }

    fn close_with(&self, code: u16, reason: &str) {
        LiveSession::close_with(self, code, reason);
    }

    fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) -> Result<()> + Send + Sync + 'static,
    {
        LiveSession::on(self, event, handler)
    }

    fn off(&self, id: HandlerId) -> bool {
        LiveSession::off(self, id)
    }
}

// ============================================================================
// Tests
// ============================================================================
