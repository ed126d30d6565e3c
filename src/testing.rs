//! Test doubles shared by unit tests.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TimerId;
use crate::protocol::{Namespace, ProtocolVersion, SessionEvent, TransportError};
use crate::session::{Credentials, LiveSession, SessionConfig};
use crate::transport::{
    DuplexSocket, Frame, OutboundFrame, READY_STATE_CLOSED, READY_STATE_CONNECTING,
    READY_STATE_OPEN, SocketEvents, SocketFactory, SocketRequest, Timer, TimerCallback,
};

// ============================================================================
// Constants
// ============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber once. Honors `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FakeSocketFactory
// ============================================================================

/// Records every socket it creates so tests can script the server side.
#[derive(Default)]
pub(crate) struct FakeSocketFactory {
    sockets: Mutex<Vec<FakeSocket>>,
    requests: Mutex<Vec<SocketRequest>>,
    fail_next: Mutex<Option<String>>,
}

impl FakeSocketFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `open` fail.
    pub(crate) fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    pub(crate) fn count(&self) -> usize {
        self.sockets.lock().len()
    }

    pub(crate) fn last(&self) -> Option<FakeSocket> {
        self.sockets.lock().last().cloned()
    }

    pub(crate) fn last_request(&self) -> Option<SocketRequest> {
        self.requests.lock().last().cloned()
    }
}

impl SocketFactory for FakeSocketFactory {
    fn open(&self, request: SocketRequest, events: SocketEvents) -> Result<Box<dyn DuplexSocket>> {
        self.requests.lock().push(request);

        if let Some(message) = self.fail_next.lock().take() {
            return Err(Error::connection(message));
        }

        let socket = FakeSocket {
            shared: Arc::new(FakeShared {
                events,
                ready_state: AtomicU8::new(READY_STATE_CONNECTING),
                sent: Mutex::new(Vec::new()),
                closes: Mutex::new(Vec::new()),
            }),
        };
        self.sockets.lock().push(socket.clone());
        Ok(Box::new(socket))
    }
}

// ============================================================================
// FakeSocket
// ============================================================================

struct FakeShared {
    events: SocketEvents,
    ready_state: AtomicU8,
    sent: Mutex<Vec<OutboundFrame>>,
    closes: Mutex<Vec<(u16, String)>>,
}

/// Scriptable socket. Both the session and the test hold a handle.
#[derive(Clone)]
pub(crate) struct FakeSocket {
    shared: Arc<FakeShared>,
}

impl FakeSocket {
    /// Completes the handshake.
    pub(crate) fn open(&self) {
        self.shared.ready_state.store(READY_STATE_OPEN, Ordering::Release);
        self.shared.events.opened();
    }

    pub(crate) fn text(&self, text: &str) {
        self.shared.events.message(Frame::Text(text.to_string()));
    }

    pub(crate) fn binary(&self, bytes: &[u8]) {
        self.shared
            .events
            .message(Frame::Binary(Bytes::copy_from_slice(bytes)));
    }

    pub(crate) fn frame(&self, frame: Frame) {
        self.shared.events.message(frame);
    }

    /// Drops the connection from the server side.
    pub(crate) fn drop_connection(&self, code: u16) {
        self.shared.ready_state.store(READY_STATE_CLOSED, Ordering::Release);
        self.shared.events.closed(code, "server closed");
    }

    pub(crate) fn fail(&self, error: TransportError) {
        self.shared.events.failed(error);
    }

    pub(crate) fn sent(&self) -> Vec<OutboundFrame> {
        self.shared.sent.lock().clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => Some(text),
                OutboundFrame::Binary(_) => None,
            })
            .collect()
    }

    pub(crate) fn closes(&self) -> Vec<(u16, String)> {
        self.shared.closes.lock().clone()
    }
}

impl DuplexSocket for FakeSocket {
    fn send(&self, frame: OutboundFrame) {
        self.shared.sent.lock().push(frame);
    }

    /// Completes the close handshake immediately.
    fn close(&self, code: u16, reason: &str) {
        self.shared.closes.lock().push((code, reason.to_string()));
        if self.shared.ready_state.swap(READY_STATE_CLOSED, Ordering::AcqRel) != READY_STATE_CLOSED {
            self.shared.events.closed(code, reason);
        }
    }

    fn ready_state(&self) -> u8 {
        self.shared.ready_state.load(Ordering::Acquire)
    }
}

/// Creates a session on a fake factory with an API key.
pub(crate) fn fake_session(
    factory: &Arc<FakeSocketFactory>,
    namespace: Namespace,
    version: ProtocolVersion,
) -> LiveSession {
    let config = SessionConfig::new(
        namespace,
        version,
        Url::parse("wss://api.example.com").expect("valid url"),
        Arc::clone(factory) as Arc<dyn SocketFactory>,
    )
    .with_credentials(Credentials::ApiKey("test-key".into()));
    LiveSession::new(config).expect("session")
}

// ============================================================================
// ManualTimer
// ============================================================================

/// Timer that only fires when the test says so.
#[derive(Default)]
pub(crate) struct ManualTimer {
    pending: Mutex<Vec<(TimerId, Duration, TimerCallback)>>,
    history: Mutex<Vec<Duration>>,
}

impl ManualTimer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delay ever scheduled, in order.
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.history.lock().clone()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Fires the oldest pending timer. Returns `false` if none was pending.
    pub(crate) fn fire_next(&self) -> bool {
        let next = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };

        match next {
            Some((_, _, callback)) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId::next();
        self.history.lock().push(delay);
        self.pending.lock().push((id, delay, callback));
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut pending = self.pending.lock();
        match pending.iter().position(|(pending_id, _, _)| *pending_id == id) {
            Some(pos) => {
                drop(pending.remove(pos));
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Collects every event a session delivers to user handlers.
pub(crate) struct Recorder {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Recorder {
    pub(crate) fn attach(session: &LiveSession) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        session.on_any(move |event| {
            let _ = tx.send(event.clone());
            Ok(())
        });
        Self { rx }
    }

    pub(crate) async fn next(&mut self) -> SessionEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.rx.recv())
            .await
            .expect("event within timeout")
            .expect("recorder channel open")
    }

    /// Skips events until one named `name` arrives.
    pub(crate) async fn next_named(&mut self, name: &str) -> SessionEvent {
        loop {
            let event = self.next().await;
            if event.name() == name {
                return event;
            }
        }
    }

    /// Asserts nothing arrives for a short while.
    pub(crate) async fn assert_quiet(&mut self) {
        if let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, self.rx.recv()).await {
            panic!("unexpected event: {event:?}");
        }
    }

    /// Returns whatever is already queued.
    pub(crate) fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
