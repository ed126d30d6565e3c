//! Wire protocol types.
//!
//! This module defines what travels over a live socket and how inbound
//! frames become typed events.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | control JSON (`{"type": ...}`) | Remote → Local | Results, metadata, server errors |
//! | binary frame | Remote → Local | Synthesized or agent audio |
//! | [`ControlRequest`] | Local → Remote | Configure, KeepAlive, CloseStream, ... |
//! | [`Outbound::Audio`] | Local → Remote | Raw microphone audio |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `namespace` | Protocol families, versions, endpoints |
//! | `message` | Control kinds and classified messages |
//! | `classify` | Frame classifier |
//! | `control` | Outbound messages |
//! | `event` | Session events |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound frame classifier.
pub mod classify;

/// Outbound control and audio messages.
pub mod control;

/// Session event types.
pub mod event;

/// Control kinds and classified messages.
pub mod message;

/// Protocol families and versions.
pub mod namespace;

// ============================================================================
// Re-exports
// ============================================================================

pub use classify::classify;
pub use control::{ControlRequest, Outbound};
pub use event::{FailureSource, SessionEvent, Speaker, TransportError, names};
pub use message::{ControlKind, ControlMessage, Message};
pub use namespace::{Namespace, ProtocolVersion};
