//! Connect-time configuration.
//!
//! [`LiveOptions`] is what a session connects with: stream configuration
//! that listen and speak encode in the handshake query, extra query pairs
//! that are always appended, and extra handshake headers.
//!
//! # Example
//!
//! ```ignore
//! use speechwire::LiveOptions;
//!
//! let options = LiveOptions::new()
//!     .with_param("model", "nova-3")
//!     .with_param("keyterm", serde_json::json!(["alpha", "beta"]))
//!     .with_header("x-trace", "abc");
//!
//! let pairs = options.to_query_pairs(true);
//! // [("keyterm", "alpha"), ("keyterm", "beta"), ("model", "nova-3")]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// LiveOptions
// ============================================================================

/// Connection configuration for a live session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveOptions {
    /// Stream configuration. Arrays become repeated query keys.
    pub params: BTreeMap<String, Value>,

    /// Query pairs appended for every namespace.
    pub query: BTreeMap<String, String>,

    /// Extra handshake headers.
    pub headers: BTreeMap<String, String>,
}

// ============================================================================
// Builder Methods
// ============================================================================

impl LiveOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a configuration parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Sets an always-appended query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets a handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl LiveOptions {
    /// Merges `other` into `self`. Values from `other` win.
    pub fn merge(&mut self, other: LiveOptions) {
        self.params.extend(other.params);
        self.query.extend(other.query);
        self.headers.extend(other.headers);
    }

    /// Returns a merged copy.
    #[must_use]
    pub fn merged(mut self, other: LiveOptions) -> Self {
        self.merge(other);
        self
    }

    /// Flattens into query pairs.
    ///
    /// `include_params` is false for namespaces that configure the stream
    /// in-band instead of in the handshake.
    #[must_use]
    pub fn to_query_pairs(&self, include_params: bool) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.params.len() + self.query.len());

        if include_params {
            for (key, value) in &self.params {
                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items {
                            if let Some(text) = scalar_to_string(item) {
                                pairs.push((key.clone(), text));
                            }
                        }
                    }
                    other => {
                        if let Some(text) = scalar_to_string(other) {
                            pairs.push((key.clone(), text));
                        }
                    }
                }
            }
        }

        pairs.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }

    /// Returns `true` if nothing is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.query.is_empty() && self.headers.is_empty()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        // Nested structures go over the wire as JSON text.
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Authentication for the socket handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Long-lived API key, sent as `Token <key>`.
    ApiKey(String),
    /// Short-lived access token, sent as `Bearer <token>`.
    AccessToken(String),
}

impl Credentials {
    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        match self {
            Self::ApiKey(key) => format!("Token {key}"),
            Self::AccessToken(token) => format!("Bearer {token}"),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
            Self::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_builder_chain() {
        let options = LiveOptions::new()
            .with_param("model", "nova-3")
            .with_query("session_id", "s-1")
            .with_header("x-trace", "abc");

        assert_eq!(options.params.get("model"), Some(&json!("nova-3")));
        assert_eq!(options.query.get("session_id").map(String::as_str), Some("s-1"));
        assert_eq!(options.headers.len(), 1);
        assert!(!options.is_empty());
    }

    #[test]
    fn test_merge_incoming_wins() {
        let mut base = LiveOptions::new()
            .with_param("model", "old")
            .with_param("punctuate", true);
        base.merge(LiveOptions::new().with_param("model", "new"));

        assert_eq!(base.params.get("model"), Some(&json!("new")));
        assert_eq!(base.params.get("punctuate"), Some(&json!(true)));
    }

    #[test]
    fn test_arrays_become_repeated_keys() {
        let options = LiveOptions::new()
            .with_param("keyterm", json!(["alpha", "beta"]))
            .with_param("sample_rate", 16000)
            .with_param("unset", Value::Null);

        let pairs = options.to_query_pairs(true);
        assert_eq!(
            pairs,
            vec![
                ("keyterm".to_string(), "alpha".to_string()),
                ("keyterm".to_string(), "beta".to_string()),
                ("sample_rate".to_string(), "16000".to_string()),
            ]
        );
    }

    #[test]
    fn test_params_excluded_but_query_kept() {
        let options = LiveOptions::new()
            .with_param("model", "nova-3")
            .with_query("request_id", "r-1");

        let pairs = options.to_query_pairs(false);
        assert_eq!(pairs, vec![("request_id".to_string(), "r-1".to_string())]);
    }

    #[test]
    fn test_credentials_header() {
        assert_eq!(Credentials::ApiKey("k".into()).authorization(), "Token k");
        assert_eq!(Credentials::AccessToken("t".into()).authorization(), "Bearer t");
        assert_eq!(format!("{:?}", Credentials::ApiKey("secret".into())), "ApiKey(..)");
    }
}
