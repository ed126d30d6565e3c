//! Live sessions.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `state` | Connection state tracker |
//! | `options` | Connect options and credentials |
//! | `handlers` | User handler table |
//! | `live` | The session itself |
//! | `resume` | Resumption identifiers |
//! | `connection` | Surface shared with supervised sessions |

// ============================================================================
// Submodules
// ============================================================================

/// Common session surface.
pub mod connection;

/// User handler table.
pub mod handlers;

/// The live session.
pub mod live;

/// Connect options.
pub mod options;

/// Resumption identifiers.
pub mod resume;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::LiveConnection;
pub use handlers::Handler;
pub use live::{LiveSession, SessionConfig, WeakSession};
pub use options::{Credentials, LiveOptions};
pub use resume::ResumeContext;
pub use state::ConnectionState;

// ============================================================================
// EmitTap
// ============================================================================

use crate::protocol::SessionEvent;

/// Intercepts every event a session emits.
///
/// Installed once by a supervisor. The tap is responsible for eventually
/// calling [`LiveSession::emit`].
pub(crate) trait EmitTap: Send + Sync {
    fn on_emit(&self, session: &LiveSession, event: SessionEvent);

    /// Called when the user closes the session, before the socket closes.
    fn on_close_requested(&self, _session: &LiveSession) {}
}
