//! Socket and timer collaborators.
//!
//! Sessions never touch a concrete WebSocket or clock. They go through the
//! traits defined here, which tests replace with scripted fakes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   SocketFactory::open    ┌──────────────────┐
//! │   LiveSession   │─────────────────────────►│  DuplexSocket    │
//! │                 │                          │  (socket task)   │
//! │   pump task     │◄─────────────────────────│  SocketEvents    │
//! └─────────────────┘  (generation, RawEvent)  └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Socket traits, frames, event reporter |
//! | `timer` | Timer trait and tokio implementation |
//! | `websocket` | tokio-tungstenite socket factory |

// ============================================================================
// Submodules
// ============================================================================

/// Socket traits and frames.
pub mod socket;

/// Timer trait and tokio timer.
pub mod timer;

/// WebSocket socket factory.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use socket::{
    ABNORMAL_CLOSURE, DuplexSocket, Frame, NORMAL_CLOSURE, OutboundFrame, READY_STATE_CLOSED,
    READY_STATE_CLOSING, READY_STATE_CONNECTING, READY_STATE_OPEN, RawSocketEvent, SocketEvents,
    SocketFactory, SocketRequest,
};
pub use timer::{Timer, TimerCallback, TokioTimer};
pub use websocket::WsSocketFactory;
