//! Session supervision.
//!
//! A [`Supervisor`] layers middleware and behaviors over a
//! [`LiveSession`](crate::session::LiveSession) without changing what user
//! handlers see.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `behavior` | `Behavior` trait |
//! | `builder` | `SupervisorBuilder` |
//! | `core` | `Supervisor`, emission pipeline, middleware worker |
//! | `keepalive` | Periodic `KeepAlive` |
//! | `reconnect` | Bounded reconnection with backoff and resumption |
//! | `turns` | Speaker turn counting |

// ============================================================================
// Submodules
// ============================================================================

/// Behavior trait.
pub mod behavior;

/// Supervisor builder.
pub mod builder;

/// Supervisor and middleware worker.
pub mod core;

/// Keep-alive behavior.
pub mod keepalive;

/// Reconnection policy.
pub mod reconnect;

/// Turn counting.
pub mod turns;

// ============================================================================
// Re-exports
// ============================================================================

pub use behavior::Behavior;
pub use builder::SupervisorBuilder;
pub use core::Supervisor;
pub use keepalive::{KeepAlive, KeepAliveConfig};
pub use reconnect::{
    CredentialRefresher, ReconnectConfig, ReconnectionPolicy, ResumeMapper, ResumeParams,
    backoff_delay,
};
pub use turns::{TurnConfig, TurnCounter};
