//! WebSocket socket factory.
//!
//! Production [`SocketFactory`] backed by `tokio-tungstenite`. Each socket
//! spawns one task that performs the handshake and then runs an event loop
//! over inbound frames and outbound commands.
//!
//! # Event Loop
//!
//! | Source | Action |
//! |--------|--------|
//! | text frame | `events.message(Frame::Text)` |
//! | binary frame | `events.message(Frame::Binary)` |
//! | close frame | remember code and reason |
//! | read error | `events.failed(..)` |
//! | `Send` command | write frame, `events.failed(..)` if the write fails |
//! | `Close` command | write close frame, keep reading until the peer answers |
//!
//! When the loop ends, `events.closed(..)` is reported exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::TransportError;

use super::socket::{
    ABNORMAL_CLOSURE, DuplexSocket, Frame, OutboundFrame, READY_STATE_CLOSED,
    READY_STATE_CLOSING, READY_STATE_CONNECTING, READY_STATE_OPEN, SocketEvents, SocketFactory,
    SocketRequest,
};

// ============================================================================
// Constants
// ============================================================================

/// Close code used when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Response headers that may carry the server-assigned request ID.
const REQUEST_ID_HEADERS: &[&str] = &["dg-request-id", "x-request-id"];

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write a frame.
    Send(OutboundFrame),
    /// Start the close handshake.
    Close { code: u16, reason: String },
}

// ============================================================================
// WsSocketFactory
// ============================================================================

/// Opens real WebSocket connections.
///
/// Requires a running tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsSocketFactory;

impl WsSocketFactory {
    /// Creates a new factory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SocketFactory for WsSocketFactory {
    fn open(&self, request: SocketRequest, events: SocketEvents) -> Result<Box<dyn DuplexSocket>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::connection(format!("No tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready_state = Arc::new(AtomicU8::new(READY_STATE_CONNECTING));

        runtime.spawn(run_socket(
            request,
            events,
            command_rx,
            Arc::clone(&ready_state),
        ));

        Ok(Box::new(WsSocket {
            command_tx,
            ready_state,
        }))
    }
}

// ============================================================================
// WsSocket
// ============================================================================

/// Handle to a socket task.
struct WsSocket {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    ready_state: Arc<AtomicU8>,
}

impl DuplexSocket for WsSocket {
    fn send(&self, frame: OutboundFrame) {
        if self.command_tx.send(SocketCommand::Send(frame)).is_err() {
            warn!("Send on a finished socket");
        }
    }

    fn close(&self, code: u16, reason: &str) {
        let state = self.ready_state.load(Ordering::Acquire);
        if state >= READY_STATE_CLOSING {
            return;
        }
        self.ready_state.store(READY_STATE_CLOSING, Ordering::Release);
        let _ = self.command_tx.send(SocketCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }

    fn ready_state(&self) -> u8 {
        self.ready_state.load(Ordering::Acquire)
    }
}

// ============================================================================
// Socket Task
// ============================================================================

async fn run_socket(
    request: SocketRequest,
    events: SocketEvents,
    command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    ready_state: Arc<AtomicU8>,
) {
    let url = request.url.to_string();

    let stream = match handshake(&request).await {
        Ok(stream) => stream,
        Err(error) => {
            let error = error
                .with_url(url)
                .with_ready_state(ready_state.load(Ordering::Acquire));
            warn!(error = %error, "WebSocket handshake failed");
            ready_state.store(READY_STATE_CLOSED, Ordering::Release);
            events.failed(error);
            events.closed(ABNORMAL_CLOSURE, "");
            return;
        }
    };

    // A close requested mid-handshake stays queued in the command channel
    // and the socket never reports open.
    if ready_state
        .compare_exchange(
            READY_STATE_CONNECTING,
            READY_STATE_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
    {
        debug!(url = %url, "WebSocket open");
        events.opened();
    } else {
        debug!(url = %url, "WebSocket closed during handshake");
    }

    let (code, reason) = run_event_loop(stream, command_rx, &events, &ready_state, &url).await;

    ready_state.store(READY_STATE_CLOSED, Ordering::Release);
    debug!(url = %url, code, "WebSocket closed");
    events.closed(code, reason);
}

async fn handshake(request: &SocketRequest) -> std::result::Result<WsStream, TransportError> {
    let mut client_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::new(e.to_string()))?;

    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::new(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::new(format!("Invalid header value: {e}")))?;
        client_request.headers_mut().insert(name, value);
    }

    match connect_async(client_request).await {
        Ok((stream, _response)) => Ok(stream),
        Err(WsError::Http(response)) => {
            let status = response.status().as_u16();
            let mut error = TransportError::new(format!("Handshake rejected with status {status}"))
                .with_status(status);
            if let Some(request_id) = REQUEST_ID_HEADERS
                .iter()
                .find_map(|name| response.headers().get(*name))
                .and_then(|value| value.to_str().ok())
            {
                error = error.with_request_id(request_id);
            }
            Err(error)
        }
        Err(e) => Err(TransportError::new(e.to_string())),
    }
}

/// Runs until the socket ends. Returns the close code and reason.
async fn run_event_loop(
    stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    events: &SocketEvents,
    ready_state: &AtomicU8,
    url: &str,
) -> (u16, String) {
    let (mut ws_write, mut ws_read) = stream.split();
    let mut close: Option<(u16, String)> = None;
    let mut commands_open = true;

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        events.message(Frame::Text(text.as_str().to_owned()));
                    }

                    Some(Ok(WsMessage::Binary(bytes))) => {
                        events.message(Frame::Binary(bytes));
                    }

                    Some(Ok(WsMessage::Close(frame))) => {
                        ready_state.store(READY_STATE_CLOSING, Ordering::Release);
                        let received = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                            None => (NO_STATUS_RECEIVED, String::new()),
                        };
                        debug!(code = received.0, "Close frame received");
                        close.get_or_insert(received);
                    }

                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        break;
                    }

                    Some(Err(e)) => {
                        let error = TransportError::new(e.to_string())
                            .with_url(url)
                            .with_ready_state(ready_state.load(Ordering::Acquire));
                        warn!(error = %error, "WebSocket error");
                        events.failed(error);
                        break;
                    }

                    // Ping, Pong and raw frames are handled by tungstenite.
                    Some(Ok(_)) => {}
                }
            }

            command = command_rx.recv(), if commands_open => {
                match command {
                    Some(SocketCommand::Send(frame)) => {
                        if !write_frame(&mut ws_write, frame, events, ready_state, url).await {
                            break;
                        }
                    }

                    Some(SocketCommand::Close { code, reason }) => {
                        debug!(code, "Closing WebSocket");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.clone().into(),
                        };
                        if let Err(e) = ws_write.send(WsMessage::Close(Some(frame))).await {
                            debug!(error = %e, "Close frame not sent");
                            close.get_or_insert((code, reason));
                            break;
                        }
                        close.get_or_insert((code, reason));
                    }

                    None => {
                        // Handle dropped without closing.
                        commands_open = false;
                        let _ = ws_write.close().await;
                    }
                }
            }
        }
    }

    close.unwrap_or((ABNORMAL_CLOSURE, String::new()))
}

/// Writes one frame. A failed write is reported and ends the socket.
async fn write_frame<S>(
    sink: &mut S,
    frame: OutboundFrame,
    events: &SocketEvents,
    ready_state: &AtomicU8,
    url: &str,
) -> bool
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let len = frame.len();
    let message = match frame {
        OutboundFrame::Text(text) => WsMessage::Text(text.into()),
        OutboundFrame::Binary(bytes) => WsMessage::Binary(bytes),
    };

    match sink.send(message).await {
        Ok(()) => {
            trace!(len, "Frame sent");
            true
        }
        Err(e) => {
            let error = TransportError::new(format!("Failed to send frame: {e}"))
                .with_url(url)
                .with_ready_state(ready_state.load(Ordering::Acquire));
            warn!(error = %error, len, "WebSocket send failed");
            events.failed(error);
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as ServerRequest, Response as ServerResponse,
    };
    use url::Url;

    use crate::transport::socket::{RawSocketEvent, TaggedEvent};

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TaggedEvent>) -> RawSocketEvent {
        let (_, event) = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        event
    }

    fn request(addr: std::net::SocketAddr) -> SocketRequest {
        SocketRequest {
            url: Url::parse(&format!("ws://{addr}/v1/listen?model=nova")).expect("url"),
            headers: vec![("Authorization".into(), "Token test-key".into())],
        }
    }

    #[tokio::test]
    async fn test_round_trip_with_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (auth_tx, auth_rx) = oneshot::channel::<Option<String>>();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let callback = move |req: &ServerRequest,
                                 resp: ServerResponse|
                  -> std::result::Result<ServerResponse, ErrorResponse> {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = auth_tx.send(auth);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .expect("server handshake");

            ws.send(WsMessage::Text(r#"{"type":"Metadata"}"#.into()))
                .await
                .expect("server text");
            ws.send(WsMessage::Binary(Bytes::from_static(&[9, 8, 7])))
                .await
                .expect("server binary");

            let echoed = ws.next().await.expect("client frame").expect("valid frame");
            ws.close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "done".into(),
            }))
            .await
            .expect("server close");
            while ws.next().await.is_some() {}
            echoed
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = WsSocketFactory::new()
            .open(request(addr), SocketEvents::new(1, tx))
            .expect("open");

        assert!(matches!(next_event(&mut rx).await, RawSocketEvent::Open));
        assert_eq!(socket.ready_state(), READY_STATE_OPEN);
        assert_eq!(
            auth_rx.await.expect("auth captured").as_deref(),
            Some("Token test-key")
        );

        match next_event(&mut rx).await {
            RawSocketEvent::Message(Frame::Text(text)) => assert!(text.contains("Metadata")),
            other => panic!("expected text, got {other:?}"),
        }
        match next_event(&mut rx).await {
            RawSocketEvent::Message(Frame::Binary(bytes)) => assert_eq!(&bytes[..], &[9, 8, 7]),
            other => panic!("expected binary, got {other:?}"),
        }

        socket.send(OutboundFrame::Binary(Bytes::from_static(b"pcm")));

        match next_event(&mut rx).await {
            RawSocketEvent::Close { code, reason } => {
                assert_eq!(code, 1001);
                assert_eq!(reason, "done");
            }
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(socket.ready_state(), READY_STATE_CLOSED);

        let echoed = server.await.expect("server task");
        assert_eq!(echoed, WsMessage::Binary(Bytes::from_static(b"pcm")));
    }

    #[tokio::test]
    async fn test_handshake_rejection_reports_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 2048];
            let _ = tcp.read(&mut buf).await;
            let _ = tcp
                .write_all(
                    b"HTTP/1.1 401 Unauthorized\r\nx-request-id: req-42\r\ncontent-length: 0\r\n\r\n",
                )
                .await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _socket = WsSocketFactory::new()
            .open(request(addr), SocketEvents::new(3, tx))
            .expect("open");

        match next_event(&mut rx).await {
            RawSocketEvent::Error(error) => {
                assert_eq!(error.status, Some(401));
                assert_eq!(error.request_id.as_deref(), Some("req-42"));
                assert!(error.url.is_some());
            }
            other => panic!("expected error, got {other:?}"),
        }
        match next_event(&mut rx).await {
            RawSocketEvent::Close { code, .. } => assert_eq!(code, ABNORMAL_CLOSURE),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_write_reports_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = SocketEvents::new(4, tx);
        let ready_state = AtomicU8::new(READY_STATE_OPEN);
        let sink = futures_util::sink::unfold((), |(), _message: WsMessage| async {
            Err::<(), WsError>(WsError::ConnectionClosed)
        });
        let mut sink = std::pin::pin!(sink);

        let written = write_frame(
            &mut sink,
            OutboundFrame::Binary(Bytes::from_static(b"pcm")),
            &events,
            &ready_state,
            "ws://127.0.0.1/v1/listen",
        )
        .await;

        assert!(!written);
        match next_event(&mut rx).await {
            RawSocketEvent::Error(error) => {
                assert!(error.message.contains("Failed to send frame"));
                assert_eq!(error.url.as_deref(), Some("ws://127.0.0.1/v1/listen"));
                assert_eq!(error.ready_state, Some(READY_STATE_OPEN));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_during_handshake_never_reports_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(tcp)
                .await
                .expect("server handshake");
            while ws.next().await.is_some() {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = WsSocketFactory::new()
            .open(request(addr), SocketEvents::new(5, tx))
            .expect("open");
        socket.close(1000, "bye");
        assert_eq!(socket.ready_state(), READY_STATE_CLOSING);

        match next_event(&mut rx).await {
            RawSocketEvent::Close { code, reason } => {
                assert_eq!(code, 1000);
                assert_eq!(reason, "bye");
            }
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(socket.ready_state(), READY_STATE_CLOSED);
    }

    #[test]
    fn test_open_without_runtime_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let addr: std::net::SocketAddr = "127.0.0.1:9".parse().expect("addr");
        let result = WsSocketFactory::new().open(request(addr), SocketEvents::new(1, tx));
        assert!(result.is_err());
    }
}
