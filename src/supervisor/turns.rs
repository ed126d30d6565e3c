//! Turn counting.
//!
//! A turn begins when the floor passes from one speaker to the other.
//! Repeated start events from the current speaker are ignored.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::middleware::MiddlewareContext;
use crate::protocol::{ControlKind, SessionEvent, Speaker};
use crate::session::LiveSession;

use super::behavior::Behavior;

// ============================================================================
// TurnConfig
// ============================================================================

/// Event names that mark a speaker taking the floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Event emitted when the user starts speaking.
    #[serde(default = "default_user_event")]
    pub user_event: String,
    /// Event emitted when the agent starts speaking.
    #[serde(default = "default_agent_event")]
    pub agent_event: String,
}

fn default_user_event() -> String {
    ControlKind::UserStartedSpeaking.as_str().to_string()
}
fn default_agent_event() -> String {
    ControlKind::AgentStartedSpeaking.as_str().to_string()
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            user_event: default_user_event(),
            agent_event: default_agent_event(),
        }
    }
}

impl TurnConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user start event.
    #[must_use]
    pub fn with_user_event(mut self, event: impl Into<String>) -> Self {
        self.user_event = event.into();
        self
    }

    /// Sets the agent start event.
    #[must_use]
    pub fn with_agent_event(mut self, event: impl Into<String>) -> Self {
        self.agent_event = event.into();
        self
    }

    fn speaker_for(&self, event: &str) -> Option<Speaker> {
        if event == self.user_event {
            Some(Speaker::User)
        } else if event == self.agent_event {
            Some(Speaker::Agent)
        } else {
            None
        }
    }
}

// ============================================================================
// TurnCounter
// ============================================================================

#[derive(Debug, Default)]
struct TurnState {
    speaker: Option<Speaker>,
    turns: u32,
}

/// Counts speaker transitions and emits `turn_started`.
#[derive(Debug)]
pub struct TurnCounter {
    config: TurnConfig,
    state: Mutex<TurnState>,
}

impl TurnCounter {
    /// Creates a counter at turn zero with nobody speaking.
    #[must_use]
    pub fn new(config: TurnConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TurnState::default()),
        }
    }

    /// Returns the number of turns so far.
    #[must_use]
    pub fn turn_count(&self) -> u32 {
        self.state.lock().turns
    }

    /// Returns who holds the floor.
    #[must_use]
    pub fn current_speaker(&self) -> Option<Speaker> {
        self.state.lock().speaker
    }

    /// Applies one event by name. Returns the new turn, if one started.
    pub fn record(&self, event: &str) -> Option<(u32, Speaker)> {
        let speaker = self.config.speaker_for(event)?;
        let mut state = self.state.lock();

        if state.speaker == Some(speaker) {
            return None;
        }

        state.turns += 1;
        state.speaker = Some(speaker);
        Some((state.turns, speaker))
    }
}

impl Behavior for TurnCounter {
    fn name(&self) -> &'static str {
        "turns"
    }

    fn observe(&self, session: &LiveSession, event: &SessionEvent, out: &mut Vec<SessionEvent>) {
        if let Some((turn, speaker)) = self.record(event.name()) {
            debug!(session_id = %session.id(), turn, %speaker, "Turn started");
            out.push(SessionEvent::TurnStarted { turn, speaker });
        }
    }

    fn enrich(&self, ctx: &mut MiddlewareContext) {
        ctx.turn_count = self.turn_count();
    }

    fn on_release(&self) {
        *self.state.lock() = TurnState::default();
    }
}

// ============================================================================
// Tests
// ============================================================================
