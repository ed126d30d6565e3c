//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```ignore
//! let client = LiveClient::builder()
//!     .base_url("wss://api.example.com")
//!     .api_key(std::env::var("SPEECH_API_KEY")?)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::middleware::MiddlewareRegistry;
use crate::session::Credentials;
use crate::transport::{SocketFactory, Timer, TokioTimer, WsSocketFactory};

use super::core::{ClientInner, LiveClient};

// ============================================================================
// LiveClientBuilder
// ============================================================================

/// Builder for configuring a [`LiveClient`].
///
/// Use [`LiveClient::builder()`] to create a new builder.
#[derive(Default)]
pub struct LiveClientBuilder {
    base_url: Option<String>,
    credentials: Option<Credentials>,
    factory: Option<Arc<dyn SocketFactory>>,
    timer: Option<Arc<dyn Timer>>,
    registry: Option<Arc<MiddlewareRegistry>>,
    headers: Vec<(String, String)>,
}

impl LiveClientBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API base URL.
    ///
    /// `http` and `https` are accepted and mapped to `ws` and `wss`.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Authenticates with an API key.
    #[inline]
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::ApiKey(key.into()));
        self
    }

    /// Authenticates with a short-lived access token.
    #[inline]
    #[must_use]
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::AccessToken(token.into()));
        self
    }

    /// Replaces the WebSocket factory.
    #[inline]
    #[must_use]
    pub fn socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replaces the timer used by supervisors.
    #[inline]
    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Shares a middleware registry with other clients.
    #[inline]
    #[must_use]
    pub fn registry(mut self, registry: Arc<MiddlewareRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Adds a header sent on every handshake.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the base URL or credentials are missing
    /// - [`Error::Config`] if the base URL is not a `ws`, `wss`, `http` or
    ///   `https` URL
    pub fn build(self) -> Result<LiveClient> {
        let base_url = self.validate_base_url()?;
        let credentials = self.validate_credentials()?;

        Ok(LiveClient {
            inner: Arc::new(ClientInner {
                base_url,
                credentials,
                factory: self
                    .factory
                    .unwrap_or_else(|| Arc::new(WsSocketFactory::new()) as Arc<dyn SocketFactory>),
                timer: self
                    .timer
                    .unwrap_or_else(|| Arc::new(TokioTimer::new()) as Arc<dyn Timer>),
                registry: self.registry.unwrap_or_else(MiddlewareRegistry::shared),
                headers: self.headers,
            }),
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl LiveClientBuilder {
    fn validate_base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().ok_or_else(|| {
            Error::config(
                "Base URL is required. Use .base_url() to set it.\n\
                 Example: LiveClient::builder().base_url(\"wss://api.example.com\")",
            )
        })?;

        let mut url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid base URL '{raw}': {e}")))?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(Error::config(format!(
                    "Unsupported base URL scheme '{other}'. Expected ws, wss, http or https."
                )));
            }
        };
        if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
            return Err(Error::config(format!("Cannot use base URL '{raw}'")));
        }

        Ok(url)
    }

    fn validate_credentials(&self) -> Result<Credentials> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            Error::config("Credentials are required. Use .api_key() or .access_token() to set them.")
        })?;

        let empty = match &credentials {
            Credentials::ApiKey(value) | Credentials::AccessToken(value) => value.trim().is_empty(),
        };
        if empty {
            return Err(Error::config("Credentials must not be empty"));
        }

        Ok(credentials)
    }
}

impl fmt::Debug for LiveClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveClientBuilder")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = LiveClientBuilder::new();
        assert!(builder.base_url.is_none());
        assert!(builder.credentials.is_none());
    }

    #[test]
    fn test_build_without_base_url_fails() {
        let result = LiveClientBuilder::new().api_key("k").build();
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_without_credentials_fails() {
        let result = LiveClientBuilder::new().base_url("wss://api.example.com").build();
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = LiveClientBuilder::new()
            .base_url("wss://api.example.com")
            .api_key("  ")
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_invalid_base_url_fails() {
        for url in ["not a url", "ftp://api.example.com"] {
            let result = LiveClientBuilder::new().base_url(url).api_key("k").build();
            assert!(matches!(result, Err(Error::Config { .. })), "{url}");
        }
    }

    #[test]
    fn test_http_schemes_are_mapped() {
        let client = tokio_test::assert_ok!(
            LiveClientBuilder::new()
                .base_url("https://api.example.com/proxy")
                .access_token("t")
                .build()
        );

        assert_eq!(client.base_url().as_str(), "wss://api.example.com/proxy");
    }

    #[test]
    fn test_last_credential_wins() {
        let builder = LiveClientBuilder::new().api_key("k").access_token("t");
        assert_eq!(builder.credentials, Some(Credentials::AccessToken("t".into())));
    }
}
