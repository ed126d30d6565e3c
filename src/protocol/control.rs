//! Outbound messages.
//!
//! Control messages are JSON objects discriminated by `type`; audio goes out
//! as raw binary, unmodified.
//!
//! # Format
//!
//! ```json
//! { "type": "KeepAlive" }
//! { "type": "Configure", "keyterms": ["speechwire"] }
//! { "type": "Speak", "text": "Hello there" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// ControlRequest
// ============================================================================

/// A control message sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ControlRequest {
    /// Change stream configuration mid-session.
    Configure {
        /// Configuration fields, flattened next to `type`.
        #[serde(flatten)]
        settings: Map<String, Value>,
    },

    /// Keep an idle stream from timing out.
    KeepAlive,

    /// Ask the server to finish and close the stream.
    CloseStream,

    /// Force the server to emit results for buffered audio.
    Finalize,

    /// Synthesize all buffered text now.
    Flush,

    /// Discard buffered text.
    Clear,

    /// Text to synthesize.
    Speak {
        /// Text content.
        text: String,
    },

    /// Full agent configuration.
    Settings {
        /// Settings fields, flattened next to `type`.
        #[serde(flatten)]
        settings: Map<String, Value>,
    },

    /// Inject a user utterance into an agent conversation.
    InjectUserMessage {
        /// Utterance text.
        content: String,
    },

    /// Make the agent say something.
    InjectAgentMessage {
        /// Message text.
        message: String,
    },

    /// Replace the agent prompt.
    UpdatePrompt {
        /// New prompt.
        prompt: String,
    },

    /// Return the result of a client-side function call.
    FunctionCallResponse {
        /// Call ID from the request.
        id: String,
        /// Function name.
        name: String,
        /// Function output.
        content: String,
    },

    /// Any other protocol-specific message.
    #[serde(skip_serializing)]
    Custom {
        /// Value of the `type` field.
        kind: String,
        /// Remaining fields.
        fields: Map<String, Value>,
    },
}

impl ControlRequest {
    /// Creates a `Configure` message from a JSON object.
    ///
    /// Non-object values produce an empty configuration.
    #[must_use]
    pub fn configure(settings: Value) -> Self {
        Self::Configure {
            settings: into_object(settings),
        }
    }

    /// Creates a `Settings` message from a JSON object.
    #[must_use]
    pub fn settings(settings: Value) -> Self {
        Self::Settings {
            settings: into_object(settings),
        }
    }

    /// Creates a protocol-specific message.
    #[must_use]
    pub fn custom(kind: impl Into<String>, fields: Value) -> Self {
        Self::Custom {
            kind: kind.into(),
            fields: into_object(fields),
        }
    }

    /// Returns the value of the `type` field.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Configure { .. } => "Configure",
            Self::KeepAlive => "KeepAlive",
            Self::CloseStream => "CloseStream",
            Self::Finalize => "Finalize",
            Self::Flush => "Flush",
            Self::Clear => "Clear",
            Self::Speak { .. } => "Speak",
            Self::Settings { .. } => "Settings",
            Self::InjectUserMessage { .. } => "InjectUserMessage",
            Self::InjectAgentMessage { .. } => "InjectAgentMessage",
            Self::UpdatePrompt { .. } => "UpdatePrompt",
            Self::FunctionCallResponse { .. } => "FunctionCallResponse",
            Self::Custom { kind, .. } => kind.as_str(),
        }
    }

    /// Serializes to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        match self {
            Self::Custom { kind, fields } => {
                let mut object = Map::with_capacity(fields.len() + 1);
                object.insert("type".into(), Value::String(kind.clone()));
                for (key, value) in fields {
                    if key != "type" {
                        object.insert(key.clone(), value.clone());
                    }
                }
                Ok(serde_json::to_string(&object)?)
            }
            other => Ok(serde_json::to_string(other)?),
        }
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Anything a session can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Raw audio, sent as a binary frame.
    Audio(Bytes),
    /// Raw text frame.
    Text(String),
    /// JSON control message.
    Control(ControlRequest),
}

impl Outbound {
    /// Returns `true` for audio payloads.
    #[inline]
    #[must_use]
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    /// Returns `true` if the payload has zero length.
    ///
    /// Control messages always carry at least their `type`.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Audio(bytes) => bytes.is_empty(),
            Self::Text(text) => text.is_empty(),
            Self::Control(_) => false,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Audio(_) => "audio",
            Self::Text(_) => "text",
            Self::Control(control) => control.type_name(),
        }
    }
}

impl From<Bytes> for Outbound {
    fn from(bytes: Bytes) -> Self {
        Self::Audio(bytes)
    }
}

impl From<Vec<u8>> for Outbound {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Audio(Bytes::from(bytes))
    }
}

impl From<ControlRequest> for Outbound {
    fn from(control: ControlRequest) -> Self {
        Self::Control(control)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn to_value(control: &ControlRequest) -> Value {
        let text = control.to_json().expect("serialize");
        serde_json::from_str(&text).expect("valid json")
    }

    #[test]
    fn test_unit_messages() {
        assert_eq!(to_value(&ControlRequest::KeepAlive), json!({ "type": "KeepAlive" }));
        assert_eq!(to_value(&ControlRequest::CloseStream), json!({ "type": "CloseStream" }));
        assert_eq!(to_value(&ControlRequest::Finalize), json!({ "type": "Finalize" }));
    }

    #[test]
    fn test_configure_flattens_settings() {
        let control = ControlRequest::configure(json!({ "keyterms": ["alpha"] }));
        assert_eq!(
            to_value(&control),
            json!({ "type": "Configure", "keyterms": ["alpha"] })
        );
    }

    #[test]
    fn test_speak_message() {
        let control = ControlRequest::Speak {
            text: "Hello".into(),
        };
        assert_eq!(to_value(&control), json!({ "type": "Speak", "text": "Hello" }));
    }

    #[test]
    fn test_custom_message_type_wins() {
        let control = ControlRequest::custom("UpdateThink", json!({ "type": "ignored", "think": {} }));
        assert_eq!(control.type_name(), "UpdateThink");
        assert_eq!(to_value(&control), json!({ "type": "UpdateThink", "think": {} }));
    }

    #[test]
    fn test_outbound_emptiness() {
        assert!(Outbound::Audio(Bytes::new()).is_empty());
        assert!(Outbound::Text(String::new()).is_empty());
        assert!(!Outbound::Control(ControlRequest::KeepAlive).is_empty());
        assert!(Outbound::from(vec![1u8]).is_audio());
    }
}
