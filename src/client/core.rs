//! Client entry point.
//!
//! A [`LiveClient`] holds what every session of one account shares: base
//! URL, credentials, socket factory, timer and middleware registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::middleware::{MiddlewareEntry, MiddlewareRegistry};
use crate::protocol::{Namespace, ProtocolVersion};
use crate::session::{Credentials, LiveSession, SessionConfig};
use crate::supervisor::{Supervisor, SupervisorBuilder};
use crate::transport::{SocketFactory, Timer};

use super::builder::LiveClientBuilder;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    pub base_url: Url,
    pub credentials: Credentials,
    pub factory: Arc<dyn SocketFactory>,
    pub timer: Arc<dyn Timer>,
    pub registry: Arc<MiddlewareRegistry>,
    pub headers: Vec<(String, String)>,
}

// ============================================================================
// LiveClient
// ============================================================================

/// Creates live sessions for one account.
///
/// Cheap to clone. Clones share the registry, so global middleware
/// registered through one clone applies to sessions created by another.
#[derive(Clone)]
pub struct LiveClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl LiveClient {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> LiveClientBuilder {
        LiveClientBuilder::new()
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Returns the shared middleware registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<MiddlewareRegistry> {
        &self.inner.registry
    }

    /// Creates a disconnected session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) outside a tokio
    /// runtime.
    pub fn session(&self, namespace: Namespace, version: ProtocolVersion) -> Result<LiveSession> {
        let mut config = SessionConfig::new(
            namespace,
            version,
            self.inner.base_url.clone(),
            Arc::clone(&self.inner.factory),
        )
        .with_credentials(self.inner.credentials.clone());

        for (name, value) in &self.inner.headers {
            config = config.with_header(name.clone(), value.clone());
        }

        let session = LiveSession::new(config)?;
        debug!(session_id = %session.id(), %namespace, %version, "Client created session");
        Ok(session)
    }

    /// Creates a transcription session.
    ///
    /// # Errors
    ///
    /// See [`LiveClient::session`].
    pub fn listen(&self, version: ProtocolVersion) -> Result<LiveSession> {
        self.session(Namespace::Listen, version)
    }

    /// Creates a text-to-speech session.
    ///
    /// # Errors
    ///
    /// See [`LiveClient::session`].
    pub fn speak(&self) -> Result<LiveSession> {
        self.session(Namespace::Speak, ProtocolVersion::V1)
    }

    /// Creates a voice agent session.
    ///
    /// # Errors
    ///
    /// See [`LiveClient::session`].
    pub fn agent(&self) -> Result<LiveSession> {
        self.session(Namespace::Agent, ProtocolVersion::V1)
    }

    /// Starts supervising `session` with this client's registry and timer.
    #[must_use]
    pub fn supervise(&self, session: LiveSession) -> SupervisorBuilder {
        Supervisor::builder(session, Arc::clone(&self.inner.registry))
            .timer(Arc::clone(&self.inner.timer))
    }

    /// Registers middleware for every session of `namespace` at `version`.
    pub fn use_middleware(
        &self,
        namespace: Namespace,
        version: ProtocolVersion,
        entry: MiddlewareEntry,
    ) -> &Self {
        self.inner.registry.use_global(namespace, version, entry);
        self
    }
}

impl fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::middleware::EventStats;
    use crate::protocol::SessionEvent;
    use crate::session::LiveOptions;
    use crate::supervisor::ReconnectConfig;
    use crate::testing::{FakeSocketFactory, ManualTimer, Recorder};

    fn client(factory: &Arc<FakeSocketFactory>, timer: &Arc<ManualTimer>) -> LiveClient {
        LiveClient::builder()
            .base_url("wss://api.example.com")
            .access_token("tok")
            .header("x-client", "speechwire-test")
            .socket_factory(Arc::clone(factory) as Arc<dyn SocketFactory>)
            .timer(Arc::clone(timer) as Arc<dyn Timer>)
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn test_sessions_share_credentials_and_headers() {
        let factory = FakeSocketFactory::new();
        let client = client(&factory, &ManualTimer::new());

        let session = client.speak().expect("session");
        session.connect(LiveOptions::new()).expect("connect");

        let request = factory.last_request().expect("request");
        assert_eq!(request.url.as_str(), "wss://api.example.com/v1/speak");
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
        assert_eq!(request.header("x-client"), Some("speechwire-test"));
        assert_eq!(session.namespace(), Namespace::Speak);
    }

    #[tokio::test]
    async fn test_global_middleware_applies_to_supervised_sessions() {
        let factory = FakeSocketFactory::new();
        let timer = ManualTimer::new();
        let client = client(&factory, &timer);
        let stats = EventStats::new();
        client.use_middleware(
            Namespace::Listen,
            ProtocolVersion::V2,
            MiddlewareEntry::any(stats.clone()),
        );

        let session = client.listen(ProtocolVersion::V2).expect("session");
        let mut recorder = Recorder::attach(&session);
        let supervisor = client
            .supervise(session)
            .with_reconnection(ReconnectConfig::default().with_jitter(false))
            .build()
            .expect("supervisor");

        supervisor.connect(LiveOptions::new()).expect("connect");
        let socket = factory.last().expect("socket");
        socket.open();
        socket.text(r#"{"type":"TurnInfo","event":"Update"}"#);
        socket.drop_connection(1006);

        recorder.next_named("reconnecting").await;
        assert_eq!(timer.pending_count(), 1);

        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.snapshot().total < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stats caught up");

        assert_eq!(stats.count("open"), 1);
        assert_eq!(stats.count("TurnInfo"), 1);
        assert_eq!(stats.count("close"), 1);
        assert_eq!(stats.count("reconnecting"), 1);
    }

    #[tokio::test]
    async fn test_other_versions_unaffected() {
        let factory = FakeSocketFactory::new();
        let client = client(&factory, &ManualTimer::new());
        let seen = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&seen);
        client.use_middleware(
            Namespace::Listen,
            ProtocolVersion::V2,
            MiddlewareEntry::any(crate::middleware::FnMiddleware::new().with_before(move |_, _| {
                *counter.lock() += 1;
                Ok(())
            })),
        );

        let session = client.listen(ProtocolVersion::V1).expect("session");
        let mut recorder = Recorder::attach(&session);
        let _supervisor = client.supervise(session.clone()).build().expect("supervisor");

        session.connect(LiveOptions::new()).expect("connect");
        factory.last().expect("socket").open();
        assert_eq!(recorder.next().await, SessionEvent::Open);
        recorder.assert_quiet().await;

        assert_eq!(*seen.lock(), 0);
    }
}
