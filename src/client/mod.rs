//! Client entry point and configuration.
//!
//! # Example
//!
//! ```ignore
//! use speechwire::{LiveClient, LiveOptions, ProtocolVersion, ReconnectConfig};
//!
//! let client = LiveClient::builder()
//!     .base_url("wss://api.example.com")
//!     .api_key(key)
//!     .build()?;
//!
//! let session = client.listen(ProtocolVersion::V1)?;
//! let supervisor = client
//!     .supervise(session)
//!     .with_reconnection(ReconnectConfig::default())
//!     .build()?;
//! supervisor.connect(LiveOptions::new().with_param("model", "nova-3"))?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Client builder.
pub mod builder;

/// Client core.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::LiveClientBuilder;
pub use core::LiveClient;
