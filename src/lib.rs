//! speechwire - Live session supervision for streaming speech APIs.
//!
//! This library drives long-lived WebSocket sessions for transcription,
//! text-to-speech and voice agents, and layers middleware, automatic
//! reconnection and turn tracking over them.
//!
//! # Architecture
//!
//! The crate is split into a raw session and an optional supervisor:
//!
//! - **Live session**: one socket at a time, frame classification, buffered
//!   control messages, user handlers
//! - **Supervisor**: middleware on a background worker, plus behaviors
//!   (reconnection, turn counting, keep-alive) driven by session events
//!
//! Key design principles:
//!
//! - Events reach user handlers in arrival order, never gated on middleware
//! - Errors inside the event path become events, never panics or returns
//! - Sockets and timers are traits, so every state machine is testable
//! - The middleware registry is an explicit shared object, not a global
//!
//! # Quick Start
//!
//! ```ignore
//! use speechwire::{LiveClient, LiveOptions, ProtocolVersion, ReconnectConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = LiveClient::builder()
//!         .base_url("wss://api.example.com")
//!         .api_key("secret")
//!         .build()?;
//!
//!     let session = client.listen(ProtocolVersion::V1)?;
//!     session.on("Results", |event| {
//!         println!("{event:?}");
//!         Ok(())
//!     });
//!
//!     let supervisor = client
//!         .supervise(session)
//!         .with_reconnection(ReconnectConfig::default())
//!         .build()?;
//!     supervisor.connect(LiveOptions::new().with_param("model", "nova-3"))?;
//!     supervisor.send(vec![0u8; 3200])?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Entry point and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`middleware`] | Middleware trait, registry, built-in stats |
//! | [`protocol`] | Namespaces, control messages, frame classifier, events |
//! | [`session`] | Live session, options, connection state |
//! | [`supervisor`] | Supervisor and its behaviors |
//! | [`transport`] | Socket and timer collaborators |

// ============================================================================
// Modules
// ============================================================================

/// Client entry point.
///
/// Use [`LiveClient::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Event middleware.
pub mod middleware;

/// Wire protocol types.
pub mod protocol;

/// Live sessions.
pub mod session;

/// Session supervision.
pub mod supervisor;

/// Socket and timer collaborators.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{LiveClient, LiveClientBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{HandlerId, SessionId, TimerId};

// Middleware types
pub use middleware::{
    EventStats, FnMiddleware, Middleware, MiddlewareContext, MiddlewareEntry, MiddlewareRegistry,
    MiddlewareScope,
};

// Protocol types
pub use protocol::{
    ControlKind, ControlMessage, ControlRequest, FailureSource, Namespace, Outbound,
    ProtocolVersion, SessionEvent, Speaker, TransportError,
};

// Session types
pub use session::{
    ConnectionState, Credentials, LiveConnection, LiveOptions, LiveSession, ResumeContext,
    SessionConfig,
};

// Supervisor types
pub use supervisor::{
    Behavior, CredentialRefresher, KeepAliveConfig, ReconnectConfig, Supervisor,
    SupervisorBuilder, TurnConfig,
};

// Transport types
pub use transport::{SocketFactory, Timer, TokioTimer, WsSocketFactory};
