//! Event statistics middleware.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::SessionEvent;

use super::context::MiddlewareContext;
use super::entry::Middleware;

// ============================================================================
// StatsSnapshot
// ============================================================================

/// Counters collected by [`EventStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Events seen, by name.
    pub events: BTreeMap<String, u64>,
    /// Total bytes of inbound audio.
    pub audio_bytes: u64,
    /// Total events seen.
    pub total: u64,
}

// ============================================================================
// EventStats
// ============================================================================

/// Counts events per name and inbound audio bytes.
///
/// Clones share counters, so one clone can be registered while another is
/// kept for reading. Each processed event gets an `event_index` extension
/// holding its position in the stream.
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    inner: Arc<Mutex<StatsSnapshot>>,
}

impl EventStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().clone()
    }

    /// Returns how many times `event` was seen.
    #[must_use]
    pub fn count(&self, event: &str) -> u64 {
        self.inner.lock().events.get(event).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Middleware for EventStats {
    async fn before(&self, event: &SessionEvent, ctx: &mut MiddlewareContext) -> Result<()> {
        let index = {
            let mut stats = self.inner.lock();
            *stats.events.entry(event.name().to_string()).or_default() += 1;
            if let Some(audio) = event.as_audio() {
                stats.audio_bytes += audio.len() as u64;
            }
            stats.total += 1;
            stats.total
        };

        ctx.set_extension("event_index", index);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    use crate::identifiers::SessionId;
    use crate::protocol::{Namespace, ProtocolVersion};

    #[tokio::test]
    async fn test_counts_events_and_audio() {
        let stats = EventStats::new();
        let reader = stats.clone();
        let mut ctx = MiddlewareContext::new(SessionId::generate(), Namespace::Speak, ProtocolVersion::V1);

        stats.before(&SessionEvent::Open, &mut ctx).await.expect("open");
        stats
            .before(&SessionEvent::Audio(Bytes::from_static(&[1, 2, 3])), &mut ctx)
            .await
            .expect("audio");
        stats
            .before(&SessionEvent::Audio(Bytes::from_static(&[4, 5])), &mut ctx)
            .await
            .expect("audio");

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.audio_bytes, 5);
        assert_eq!(reader.count("Audio"), 2);
        assert_eq!(reader.count("open"), 1);
        assert_eq!(reader.count("close"), 0);
        assert_eq!(ctx.extension("event_index"), Some(&serde_json::json!(3)));
    }
}
