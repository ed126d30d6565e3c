//! Classified inbound messages.
//!
//! Every inbound frame becomes exactly one [`Message`]. JSON control
//! messages keep their full payload; only the `type` discriminator is lifted
//! into the closed [`ControlKind`] union.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use super::namespace::{Namespace, ProtocolVersion};

// ============================================================================
// ControlKind
// ============================================================================

/// Server control message types.
///
/// Unknown or absent discriminators map to [`ControlKind::Unhandled`] so new
/// server message types pass through instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    // Listen
    /// Transcription result.
    Results,
    /// End of an utterance.
    UtteranceEnd,
    /// Voice activity detected.
    SpeechStarted,
    /// Turn-based listen handshake completed.
    Connected,
    /// Turn-based listen turn update.
    TurnInfo,
    /// `Configure` accepted.
    ConfigureSuccess,
    /// `Configure` rejected.
    ConfigureFailure,

    // Speak
    /// Buffered text was flushed to audio.
    Flushed,
    /// Buffered text was discarded.
    Cleared,

    // Agent
    /// Agent handshake greeting.
    Welcome,
    /// Agent settings accepted.
    SettingsApplied,
    /// Prompt update accepted.
    PromptUpdated,
    /// Voice update accepted.
    SpeakUpdated,
    /// One conversation line.
    ConversationText,
    /// The user began speaking.
    UserStartedSpeaking,
    /// The agent is producing a reply.
    AgentThinking,
    /// The agent wants a client-side function called.
    FunctionCallRequest,
    /// The agent began speaking.
    AgentStartedSpeaking,
    /// The agent finished sending audio.
    AgentAudioDone,
    /// An injected message was refused.
    InjectionRefused,
    /// Conversation history replay.
    History,

    // Shared
    /// Session metadata (carries resumption identifiers).
    Metadata,
    /// Server-side failure.
    Error,
    /// Server-side warning.
    Warning,

    /// Unrecognized or missing type.
    Unhandled,
}

impl ControlKind {
    /// Returns the wire name, which is also the event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Results => "Results",
            Self::UtteranceEnd => "UtteranceEnd",
            Self::SpeechStarted => "SpeechStarted",
            Self::Connected => "Connected",
            Self::TurnInfo => "TurnInfo",
            Self::ConfigureSuccess => "ConfigureSuccess",
            Self::ConfigureFailure => "ConfigureFailure",
            Self::Flushed => "Flushed",
            Self::Cleared => "Cleared",
            Self::Welcome => "Welcome",
            Self::SettingsApplied => "SettingsApplied",
            Self::PromptUpdated => "PromptUpdated",
            Self::SpeakUpdated => "SpeakUpdated",
            Self::ConversationText => "ConversationText",
            Self::UserStartedSpeaking => "UserStartedSpeaking",
            Self::AgentThinking => "AgentThinking",
            Self::FunctionCallRequest => "FunctionCallRequest",
            Self::AgentStartedSpeaking => "AgentStartedSpeaking",
            Self::AgentAudioDone => "AgentAudioDone",
            Self::InjectionRefused => "InjectionRefused",
            Self::History => "History",
            Self::Metadata => "Metadata",
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Unhandled => "Unhandled",
        }
    }

    /// Parses a wire name without regard to protocol family.
    fn from_wire(name: &str) -> Option<Self> {
        let kind = match name {
            "Results" => Self::Results,
            "UtteranceEnd" => Self::UtteranceEnd,
            "SpeechStarted" => Self::SpeechStarted,
            "Connected" => Self::Connected,
            "TurnInfo" => Self::TurnInfo,
            "ConfigureSuccess" => Self::ConfigureSuccess,
            "ConfigureFailure" => Self::ConfigureFailure,
            "Flushed" => Self::Flushed,
            "Cleared" => Self::Cleared,
            "Welcome" => Self::Welcome,
            "SettingsApplied" => Self::SettingsApplied,
            "PromptUpdated" => Self::PromptUpdated,
            "SpeakUpdated" => Self::SpeakUpdated,
            "ConversationText" => Self::ConversationText,
            "UserStartedSpeaking" => Self::UserStartedSpeaking,
            "AgentThinking" => Self::AgentThinking,
            "FunctionCallRequest" => Self::FunctionCallRequest,
            "AgentStartedSpeaking" => Self::AgentStartedSpeaking,
            "AgentAudioDone" => Self::AgentAudioDone,
            "InjectionRefused" => Self::InjectionRefused,
            "History" => Self::History,
            "Metadata" => Self::Metadata,
            "Error" => Self::Error,
            "Warning" => Self::Warning,
            _ => return None,
        };
        Some(kind)
    }

    /// Resolves a discriminator against the family's known type set.
    #[must_use]
    pub fn resolve(namespace: Namespace, version: ProtocolVersion, name: Option<&str>) -> Self {
        name.and_then(Self::from_wire)
            .filter(|kind| namespace.known_types(version).contains(kind))
            .unwrap_or(Self::Unhandled)
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ControlMessage
// ============================================================================

/// A parsed JSON control message.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    /// Resolved message type.
    pub kind: ControlKind,
    /// The `type` field exactly as received, if present.
    pub raw_type: Option<String>,
    /// The complete parsed object.
    pub payload: Value,
}

impl ControlMessage {
    /// Creates a control message from a parsed JSON value.
    #[must_use]
    pub fn from_value(namespace: Namespace, version: ProtocolVersion, payload: Value) -> Self {
        let raw_type = payload
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let kind = ControlKind::resolve(namespace, version, raw_type.as_deref());

        Self {
            kind,
            raw_type,
            payload,
        }
    }

    /// Returns `true` if the server reported a failure.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == ControlKind::Error
    }

    /// Gets a string field from the payload.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Gets an unsigned integer field from the payload.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }
}

// ============================================================================
// Message
// ============================================================================

/// Result of classifying one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Structured JSON control message.
    Control(ControlMessage),
    /// Non-empty binary payload, normalized from any binary container.
    Binary(Bytes),
    /// A zero-length binary frame.
    EmptyBinary,
    /// Text that is not a JSON object, carried verbatim.
    Malformed(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_resolve_known_type() {
        let kind = ControlKind::resolve(Namespace::Listen, ProtocolVersion::V1, Some("Results"));
        assert_eq!(kind, ControlKind::Results);
    }

    #[test]
    fn test_resolve_type_from_other_family_is_unhandled() {
        let kind = ControlKind::resolve(Namespace::Speak, ProtocolVersion::V1, Some("Results"));
        assert_eq!(kind, ControlKind::Unhandled);
    }

    #[test]
    fn test_resolve_missing_type_is_unhandled() {
        let kind = ControlKind::resolve(Namespace::Agent, ProtocolVersion::V1, None);
        assert_eq!(kind, ControlKind::Unhandled);
    }

    #[test]
    fn test_wire_names_round_trip() {
        for ns in [Namespace::Listen, Namespace::Speak, Namespace::Agent] {
            for kind in ns.known_types(ProtocolVersion::V1) {
                assert_eq!(ControlKind::from_wire(kind.as_str()), Some(*kind));
            }
        }
    }

    #[test]
    fn test_control_message_keeps_raw_type() {
        let msg = ControlMessage::from_value(
            Namespace::Listen,
            ProtocolVersion::V1,
            json!({ "type": "SomethingNew", "x": 1 }),
        );
        assert_eq!(msg.kind, ControlKind::Unhandled);
        assert_eq!(msg.raw_type.as_deref(), Some("SomethingNew"));
        assert_eq!(msg.get_u64("x"), Some(1));
    }

    #[test]
    fn test_control_message_error() {
        let msg = ControlMessage::from_value(
            Namespace::Agent,
            ProtocolVersion::V1,
            json!({ "type": "Error", "description": "bad settings" }),
        );
        assert!(msg.is_error());
        assert_eq!(msg.get_str("description"), Some("bad settings"));
    }
}
