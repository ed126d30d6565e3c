//! Live session.
//!
//! A [`LiveSession`] owns at most one socket at a time and turns its raw
//! callbacks into [`SessionEvent`]s for user handlers.
//!
//! # Socket Generations
//!
//! Every socket the session creates gets a fresh generation number, and its
//! [`SocketEvents`] reporter is tagged with it. The per-session pump task
//! drops anything tagged with an older generation. Replacing a socket on
//! reconnect therefore never leaks a `close` from the discarded socket, and
//! a socket's callbacks exist only inside the factory call that created it.
//!
//! # Send Rules
//!
//! | Payload | Open | Not open |
//! |---------|------|----------|
//! | zero length | `warning`, dropped | `warning`, dropped |
//! | control | sent | buffered, flushed in order on `open` |
//! | audio | sent | `warning`, dropped |
//! | raw text | sent | `error` event |

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, SessionId};
use crate::protocol::{
    ControlRequest, FailureSource, Message, Namespace, Outbound, ProtocolVersion, SessionEvent,
    TransportError, classify,
};
use crate::transport::socket::TaggedEvent;
use crate::transport::{
    ABNORMAL_CLOSURE, DuplexSocket, NORMAL_CLOSURE, OutboundFrame, READY_STATE_CLOSED,
    READY_STATE_OPEN, RawSocketEvent, SocketEvents, SocketFactory, SocketRequest,
};

use super::EmitTap;
use super::handlers::{Handler, HandlerTable, panic_message};
use super::options::{Credentials, LiveOptions};
use super::state::ConnectionState;

// ============================================================================
// SessionConfig
// ============================================================================

/// Everything needed to create a [`LiveSession`].
#[derive(Clone)]
pub struct SessionConfig {
    /// Protocol family.
    pub namespace: Namespace,
    /// Protocol version.
    pub version: ProtocolVersion,
    /// Base URL, e.g. `wss://api.example.com`.
    pub base_url: Url,
    /// Handshake path. Defaults to the family's endpoint.
    pub endpoint: Option<String>,
    /// Handshake credentials.
    pub credentials: Option<Credentials>,
    /// Headers sent on every handshake.
    pub headers: Vec<(String, String)>,
    /// Socket factory.
    pub factory: Arc<dyn SocketFactory>,
}

impl SessionConfig {
    /// Creates a config with no credentials and the default endpoint.
    #[must_use]
    pub fn new(
        namespace: Namespace,
        version: ProtocolVersion,
        base_url: Url,
        factory: Arc<dyn SocketFactory>,
    ) -> Self {
        Self {
            namespace,
            version,
            base_url,
            endpoint: None,
            credentials: None,
            headers: Vec::new(),
            factory,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the handshake path.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Adds a handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("namespace", &self.namespace)
            .field("version", &self.version)
            .field("base_url", &self.base_url.as_str())
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Types
// ============================================================================

/// The current socket and the generation it was created for.
struct SocketSlot {
    generation: u64,
    socket: Box<dyn DuplexSocket>,
}

struct SessionInner {
    id: SessionId,
    namespace: Namespace,
    version: ProtocolVersion,
    base_url: Url,
    headers: Vec<(String, String)>,
    factory: Arc<dyn SocketFactory>,
    credentials: Mutex<Option<Credentials>>,
    endpoint: Mutex<String>,
    options: Mutex<LiveOptions>,
    last_url: Mutex<Option<String>>,

    /// Lock order: `socket` before `pending`.
    socket: Mutex<Option<SocketSlot>>,
    pending: Mutex<VecDeque<String>>,
    generation: AtomicU64,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,

    handlers: Mutex<HandlerTable>,
    close_requested: AtomicBool,
    tap: OnceLock<Weak<dyn EmitTap>>,
}

// ============================================================================
// LiveSession
// ============================================================================

/// One long-lived streaming connection.
///
/// Cloning is cheap; clones share the same socket and handlers.
///
/// # Example
///
/// ```ignore
/// let session = client.listen(ProtocolVersion::V1)?;
/// session.on("Results", |event| {
///     println!("{event:?}");
///     Ok(())
/// });
/// session.connect(LiveOptions::new().with_param("model", "nova-3"))?;
/// session.send(audio_chunk)?;
/// ```
#[derive(Clone)]
pub struct LiveSession {
    inner: Arc<SessionInner>,
}

/// Non-owning reference to a [`LiveSession`].
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<SessionInner>,
}

impl WeakSession {
    /// Returns the session if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<LiveSession> {
        self.inner.upgrade().map(|inner| LiveSession { inner })
    }
}

impl fmt::Debug for WeakSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSession").finish_non_exhaustive()
    }
}

// ============================================================================
// LiveSession - Construction
// ============================================================================

impl LiveSession {
    /// Creates a disconnected session and starts its event pump.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::config(format!("LiveSession requires a tokio runtime: {e}")))?;

        let endpoint = config
            .endpoint
            .unwrap_or_else(|| config.namespace.default_endpoint(config.version).to_string());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            id: SessionId::generate(),
            namespace: config.namespace,
            version: config.version,
            base_url: config.base_url,
            headers: config.headers,
            factory: config.factory,
            credentials: Mutex::new(config.credentials),
            endpoint: Mutex::new(endpoint),
            options: Mutex::new(LiveOptions::default()),
            last_url: Mutex::new(None),
            socket: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            generation: AtomicU64::new(0),
            events_tx,
            handlers: Mutex::new(HandlerTable::default()),
            close_requested: AtomicBool::new(false),
            tap: OnceLock::new(),
        });

        runtime.spawn(run_pump(Arc::downgrade(&inner), events_rx));

        debug!(
            session_id = %inner.id,
            namespace = %inner.namespace,
            version = %inner.version,
            "Session created"
        );

        Ok(Self { inner })
    }

    /// Returns a non-owning reference.
    #[must_use]
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// LiveSession - Accessors
// ============================================================================

impl LiveSession {
    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the protocol family.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.inner.namespace
    }

    /// Returns the protocol version.
    #[inline]
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.inner.version
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Returns the handshake path.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.inner.endpoint.lock().clone()
    }

    /// Returns the options of the last connect, including merged resume data.
    #[must_use]
    pub fn options(&self) -> LiveOptions {
        self.inner.options.lock().clone()
    }

    /// Returns the URL of the most recent handshake.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.inner.last_url.lock().clone()
    }

    /// Returns the connection state of the current socket.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let ready_state = self
            .inner
            .socket
            .lock()
            .as_ref()
            .map(|slot| slot.socket.ready_state());
        ConnectionState::from_ready_state(ready_state)
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Returns `true` after a user-requested close, until the next connect.
    #[inline]
    #[must_use]
    pub fn is_close_requested(&self) -> bool {
        self.inner.close_requested.load(Ordering::Acquire)
    }

    /// Returns the number of control messages waiting for `open`.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    /// Replaces the credentials used by the next handshake.
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.inner.credentials.lock() = Some(credentials);
    }
}

// ============================================================================
// LiveSession - Connection
// ============================================================================

impl LiveSession {
    /// Connects with `options` at the current endpoint.
    ///
    /// Does nothing if a socket is already connecting or open.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the factory cannot create
    /// a socket. Both are also reported as `error` and `close` events.
    pub fn connect(&self, options: LiveOptions) -> Result<()> {
        let endpoint = self.endpoint();
        self.connect_at(options, endpoint)
    }

    /// Connects with `options` at `endpoint`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::connect`].
    pub fn connect_at(&self, options: LiveOptions, endpoint: impl Into<String>) -> Result<()> {
        let state = self.state();
        if state.is_active() {
            debug!(session_id = %self.inner.id, %state, "Connect ignored, socket already active");
            return Ok(());
        }

        *self.inner.options.lock() = options;
        *self.inner.endpoint.lock() = endpoint.into();
        self.inner.close_requested.store(false, Ordering::Release);

        self.open_socket()
    }

    /// Replaces the socket, merging `options` into the current options.
    ///
    /// The discarded socket never reports a `close`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::connect`].
    pub fn reconnect(&self, options: LiveOptions) -> Result<()> {
        self.inner.options.lock().merge(options);
        self.inner.close_requested.store(false, Ordering::Release);

        debug!(session_id = %self.inner.id, "Reconnecting");
        self.open_socket()
    }

    /// Closes with normal closure.
    pub fn close(&self) {
        self.close_with(NORMAL_CLOSURE, "");
    }

    /// Closes with `code` and `reason`.
    ///
    /// Marks the closure as user-requested, which suppresses automatic
    /// reconnection, and discards buffered control messages.
    pub fn close_with(&self, code: u16, reason: &str) {
        self.inner.close_requested.store(true, Ordering::Release);
        self.inner.pending.lock().clear();

        info!(session_id = %self.inner.id, code, "Closing session");

        if let Some(tap) = self.inner.tap.get().and_then(Weak::upgrade) {
            tap.on_close_requested(self);
        }

        if let Some(slot) = self.inner.socket.lock().as_ref() {
            slot.socket.close(code, reason);
        }
    }

    /// Returns the generation of the most recently opened socket.
    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    fn open_socket(&self) -> Result<()> {
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => {
                self.report_open_failure(&e, None);
                return Err(e);
            }
        };
        let url = request.url.to_string();
        *self.inner.last_url.lock() = Some(url.clone());

        let mut slot = self.inner.socket.lock();

        if let Some(retired) = slot.take() {
            trace!(
                session_id = %self.inner.id,
                generation = retired.generation,
                "Retiring socket"
            );
            retired.socket.close(NORMAL_CLOSURE, "replaced");
        }

        debug!(session_id = %self.inner.id, url = %url, generation, "Opening socket");

        let events = SocketEvents::new(generation, self.inner.events_tx.clone());
        match self.inner.factory.open(request, events) {
            Ok(socket) => {
                *slot = Some(SocketSlot { generation, socket });
                Ok(())
            }
            Err(e) => {
                drop(slot);
                self.report_open_failure(&e, Some(url));
                Err(e)
            }
        }
    }

    fn build_request(&self) -> Result<SocketRequest> {
        let options = self.options();
        let endpoint = self.endpoint();

        let url = build_url(
            &self.inner.base_url,
            &endpoint,
            &options,
            self.inner.namespace.encodes_options_in_query(),
        )?;

        let mut headers = Vec::with_capacity(1 + self.inner.headers.len() + options.headers.len());
        if let Some(credentials) = self.inner.credentials.lock().as_ref() {
            headers.push(("Authorization".to_string(), credentials.authorization()));
        }
        headers.extend(self.inner.headers.iter().cloned());
        headers.extend(options.headers);

        Ok(SocketRequest { url, headers })
    }

    fn report_open_failure(&self, error: &Error, url: Option<String>) {
        error!(session_id = %self.inner.id, error = %error, "Failed to open socket");

        let mut transport = TransportError::new(error.to_string()).with_ready_state(READY_STATE_CLOSED);
        if let Some(url) = url {
            transport = transport.with_url(url);
        }

        self.dispatch(SessionEvent::Error(transport));
        self.dispatch(SessionEvent::Close {
            code: ABNORMAL_CLOSURE,
            reason: error.to_string(),
        });
    }
}

/// Joins `endpoint` onto `base` and appends the query.
pub(crate) fn build_url(
    base: &Url,
    endpoint: &str,
    options: &LiveOptions,
    include_params: bool,
) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base.join(endpoint.trim_start_matches('/'))?;

    let pairs = options.to_query_pairs(include_params);
    if !pairs.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}

// ============================================================================
// LiveSession - Sending
// ============================================================================

impl LiveSession {
    /// Sends audio, raw text or a control message.
    ///
    /// Never fails for connection reasons; those outcomes are reported as
    /// events (see the module table).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a control message cannot be serialized.
    pub fn send(&self, data: impl Into<Outbound>) -> Result<()> {
        let data = data.into();

        if data.is_empty() {
            warn!(session_id = %self.inner.id, kind = data.label(), "Dropping zero-length send");
            self.dispatch(SessionEvent::Warning {
                message: format!("Dropped zero-length {} send", data.label()),
            });
            return Ok(());
        }

        let frame = match &data {
            Outbound::Audio(bytes) => OutboundFrame::Binary(bytes.clone()),
            Outbound::Text(text) => OutboundFrame::Text(text.clone()),
            Outbound::Control(control) => OutboundFrame::Text(control.to_json()?),
        };

        let ready_state = {
            let slot = self.inner.socket.lock();
            let ready_state = slot.as_ref().map(|s| s.socket.ready_state());
            let open = slot
                .as_ref()
                .filter(|_| ready_state == Some(READY_STATE_OPEN));

            if let Outbound::Control(_) = &data {
                let mut pending = self.inner.pending.lock();
                match (open, frame) {
                    // Buffered messages go out first, on the `open` event.
                    (Some(slot), frame) if pending.is_empty() => {
                        trace!(session_id = %self.inner.id, kind = data.label(), "Control sent");
                        slot.socket.send(frame);
                    }
                    (_, OutboundFrame::Text(text)) => {
                        trace!(session_id = %self.inner.id, kind = data.label(), "Control buffered");
                        pending.push_back(text);
                    }
                    (_, OutboundFrame::Binary(_)) => {}
                }
                return Ok(());
            }

            if let Some(slot) = open {
                trace!(session_id = %self.inner.id, len = frame.len(), "Frame sent");
                slot.socket.send(frame);
                return Ok(());
            }

            ready_state
        };

        if data.is_audio() {
            warn!(session_id = %self.inner.id, "Dropping audio, session not open");
            self.dispatch(SessionEvent::Warning {
                message: "Dropped audio frame: session not open".to_string(),
            });
        } else {
            let mut transport =
                TransportError::new(format!("Cannot send {}: session not open", data.label()));
            if let Some(ready_state) = ready_state {
                transport = transport.with_ready_state(ready_state);
            }
            if let Some(url) = self.url() {
                transport = transport.with_url(url);
            }
            self.dispatch(SessionEvent::Error(transport));
        }

        Ok(())
    }

    /// Sends any control message.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    #[inline]
    pub fn send_control(&self, control: ControlRequest) -> Result<()> {
        self.send(Outbound::Control(control))
    }

    /// Sends `Configure` with the fields of `settings`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn configure(&self, settings: Value) -> Result<()> {
        self.send_control(ControlRequest::configure(settings))
    }

    /// Sends `KeepAlive`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn keep_alive(&self) -> Result<()> {
        self.send_control(ControlRequest::KeepAlive)
    }

    /// Sends `Finalize`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn finalize(&self) -> Result<()> {
        self.send_control(ControlRequest::Finalize)
    }

    /// Sends `CloseStream`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn close_stream(&self) -> Result<()> {
        self.send_control(ControlRequest::CloseStream)
    }

    /// Sends `Flush`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn flush(&self) -> Result<()> {
        self.send_control(ControlRequest::Flush)
    }

    /// Sends `Clear`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn clear(&self) -> Result<()> {
        self.send_control(ControlRequest::Clear)
    }

    /// Sends `Speak` with `text`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn speak(&self, text: impl Into<String>) -> Result<()> {
        self.send_control(ControlRequest::Speak { text: text.into() })
    }

    /// Sends agent `Settings`.
    ///
    /// # Errors
    ///
    /// See [`LiveSession::send`].
    pub fn send_settings(&self, settings: Value) -> Result<()> {
        self.send_control(ControlRequest::settings(settings))
    }

    fn flush_pending(&self) {
        let slot = self.inner.socket.lock();
        let Some(slot) = slot.as_ref() else {
            return;
        };

        let mut pending = self.inner.pending.lock();
        if pending.is_empty() {
            return;
        }

        debug!(
            session_id = %self.inner.id,
            count = pending.len(),
            "Flushing buffered control messages"
        );
        for text in pending.drain(..) {
            slot.socket.send(OutboundFrame::Text(text));
        }
    }
}

// ============================================================================
// LiveSession - Handlers
// ============================================================================

impl LiveSession {
    /// Registers a handler for events named `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.on_handler(event, Arc::new(handler))
    }

    /// Registers a shared handler for events named `event`.
    pub fn on_handler(&self, event: &str, handler: Handler) -> HandlerId {
        self.inner.handlers.lock().insert(event, handler)
    }

    /// Registers a handler for every event.
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.handlers.lock().insert_any(Arc::new(handler))
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.handlers.lock().remove(id)
    }

    /// Delivers `event` to user handlers, in registration order.
    ///
    /// Handler failures and panics are reported as `middleware_error`
    /// events and never stop delivery to the remaining handlers.
    pub fn emit(&self, event: &SessionEvent) {
        let handlers = self.inner.handlers.lock().snapshot(event.name());

        for handler in handlers {
            let failure = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("Handler panicked: {}", panic_message(payload.as_ref())),
            };
            self.report_handler_failure(event, failure);
        }
    }

    fn report_handler_failure(&self, event: &SessionEvent, message: String) {
        if matches!(event, SessionEvent::MiddlewareError { .. }) {
            warn!(session_id = %self.inner.id, error = %message, "middleware_error handler failed");
            return;
        }

        warn!(
            session_id = %self.inner.id,
            event = event.name(),
            error = %message,
            "Handler failed"
        );
        self.emit(&SessionEvent::MiddlewareError {
            source: FailureSource::Handler,
            event: event.name().to_string(),
            message,
        });
    }

    /// Routes an event through the installed tap, or straight to handlers.
    pub(crate) fn dispatch(&self, event: SessionEvent) {
        match self.inner.tap.get().and_then(Weak::upgrade) {
            Some(tap) => tap.on_emit(self, event),
            None => self.emit(&event),
        }
    }

    /// Installs the emission tap. Only one tap per session.
    pub(crate) fn install_tap(&self, tap: Weak<dyn EmitTap>) -> Result<()> {
        self.inner
            .tap
            .set(tap)
            .map_err(|_| Error::already_supervised(self.inner.id))
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.inner.id)
            .field("namespace", &self.inner.namespace)
            .field("version", &self.inner.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Event Pump
// ============================================================================

async fn run_pump(session: Weak<SessionInner>, mut events_rx: mpsc::UnboundedReceiver<TaggedEvent>) {
    while let Some((generation, raw)) = events_rx.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        let session = LiveSession { inner };

        if generation != session.inner.generation.load(Ordering::Acquire) {
            trace!(session_id = %session.inner.id, generation, "Dropping event from retired socket");
            continue;
        }

        session.handle_raw(raw).await;
    }

    trace!("Session pump terminated");
}

impl LiveSession {
    async fn handle_raw(&self, raw: RawSocketEvent) {
        match raw {
            RawSocketEvent::Open => {
                info!(session_id = %self.inner.id, "Session open");
                self.flush_pending();
                self.dispatch(SessionEvent::Open);
            }

            RawSocketEvent::Close { code, reason } => {
                info!(session_id = %self.inner.id, code, reason = %reason, "Session closed");
                self.dispatch(SessionEvent::Close { code, reason });
            }

            RawSocketEvent::Error(error) => {
                error!(session_id = %self.inner.id, error = %error, "Transport error");
                self.dispatch(SessionEvent::Error(error));
            }

            RawSocketEvent::Message(frame) => {
                match classify(frame, self.inner.namespace, self.inner.version).await {
                    Ok(Message::Control(control)) => {
                        trace!(session_id = %self.inner.id, kind = %control.kind, "Control message");
                        self.dispatch(SessionEvent::Control(control));
                    }
                    Ok(Message::Binary(bytes)) => {
                        trace!(session_id = %self.inner.id, len = bytes.len(), "Binary frame");
                        self.dispatch(SessionEvent::Audio(bytes));
                    }
                    Ok(Message::EmptyBinary) => {
                        warn!(session_id = %self.inner.id, "Dropping zero-length binary frame");
                        self.dispatch(SessionEvent::Warning {
                            message: "Dropped zero-length binary frame".to_string(),
                        });
                    }
                    Ok(Message::Malformed(raw)) => {
                        debug!(session_id = %self.inner.id, len = raw.len(), "Unparseable text frame");
                        self.dispatch(SessionEvent::Unparsed { raw });
                    }
                    Err(e) => {
                        let mut transport =
                            TransportError::new(format!("Failed to read binary frame: {e}"));
                        if let Some(url) = self.url() {
                            transport = transport.with_url(url);
                        }
                        error!(session_id = %self.inner.id, error = %transport, "Frame read failed");
                        self.dispatch(SessionEvent::Error(transport));
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
