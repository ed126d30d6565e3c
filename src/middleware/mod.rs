//! Event middleware.
//!
//! Middleware observes session events on a background worker, before and
//! after user handlers. Registration is global (per namespace and version)
//! or per session.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | Per-event context shared along a chain |
//! | `entry` | `Middleware` trait and registration entries |
//! | `registry` | Global and instance registrations, chain execution |
//! | `stats` | Built-in event counters |

// ============================================================================
// Submodules
// ============================================================================

/// Per-event context.
pub mod context;

/// Middleware trait and entries.
pub mod entry;

/// Middleware registry.
pub mod registry;

/// Event statistics.
pub mod stats;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::MiddlewareContext;
pub use entry::{FnMiddleware, Middleware, MiddlewareEntry, MiddlewareScope};
pub use registry::{MiddlewareFailure, MiddlewareRegistry};
pub use stats::{EventStats, StatsSnapshot};
