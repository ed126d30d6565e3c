//! Protocol families and versions.
//!
//! Each live session speaks one protocol family ([`Namespace`]) at one
//! [`ProtocolVersion`]. Together they select the handshake endpoint, how
//! connect options travel, and which server control types are recognized.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::ControlKind;

// ============================================================================
// Namespace
// ============================================================================

/// Protocol family of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Streaming speech-to-text.
    Listen,
    /// Streaming text-to-speech.
    Speak,
    /// Bidirectional voice agent.
    Agent,
}

impl Namespace {
    /// Returns the lowercase name used in logs and URLs.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Listen => "listen",
            Self::Speak => "speak",
            Self::Agent => "agent",
        }
    }

    /// Returns `true` if connect options are sent as handshake query
    /// parameters.
    ///
    /// The agent protocol is configured with a `Settings` message after the
    /// socket opens instead.
    #[inline]
    #[must_use]
    pub const fn encodes_options_in_query(&self) -> bool {
        matches!(self, Self::Listen | Self::Speak)
    }

    /// Returns the default handshake path for this family at `version`.
    #[must_use]
    pub const fn default_endpoint(&self, version: ProtocolVersion) -> &'static str {
        match (self, version) {
            (Self::Listen, ProtocolVersion::V2) => "v2/listen",
            (Self::Listen, ProtocolVersion::V1) => "v1/listen",
            (Self::Speak, _) => "v1/speak",
            (Self::Agent, _) => "v1/agent/converse",
        }
    }

    /// Returns the server control types this family understands.
    ///
    /// Anything outside this set classifies as [`ControlKind::Unhandled`].
    #[must_use]
    pub const fn known_types(&self, version: ProtocolVersion) -> &'static [ControlKind] {
        match (self, version) {
            (Self::Listen, ProtocolVersion::V1) => LISTEN_V1,
            (Self::Listen, ProtocolVersion::V2) => LISTEN_V2,
            (Self::Speak, _) => SPEAK_V1,
            (Self::Agent, _) => AGENT_V1,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ProtocolVersion
// ============================================================================

/// Wire protocol version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// First generation protocol, available for every family.
    #[default]
    V1,
    /// Turn-based listen protocol.
    V2,
}

impl ProtocolVersion {
    /// Returns the short name (`v1`, `v2`).
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Known Type Tables
// ============================================================================

const LISTEN_V1: &[ControlKind] = &[
    ControlKind::Results,
    ControlKind::Metadata,
    ControlKind::UtteranceEnd,
    ControlKind::SpeechStarted,
    ControlKind::Error,
    ControlKind::Warning,
];

const LISTEN_V2: &[ControlKind] = &[
    ControlKind::Connected,
    ControlKind::TurnInfo,
    ControlKind::ConfigureSuccess,
    ControlKind::ConfigureFailure,
    ControlKind::Metadata,
    ControlKind::Error,
    ControlKind::Warning,
];

const SPEAK_V1: &[ControlKind] = &[
    ControlKind::Metadata,
    ControlKind::Flushed,
    ControlKind::Cleared,
    ControlKind::Error,
    ControlKind::Warning,
];

const AGENT_V1: &[ControlKind] = &[
    ControlKind::Welcome,
    ControlKind::SettingsApplied,
    ControlKind::PromptUpdated,
    ControlKind::SpeakUpdated,
    ControlKind::ConversationText,
    ControlKind::UserStartedSpeaking,
    ControlKind::AgentThinking,
    ControlKind::FunctionCallRequest,
    ControlKind::AgentStartedSpeaking,
    ControlKind::AgentAudioDone,
    ControlKind::InjectionRefused,
    ControlKind::History,
    ControlKind::Metadata,
    ControlKind::Error,
    ControlKind::Warning,
];

// ============================================================================
// Tests
// ============================================================================
