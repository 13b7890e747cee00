//! Socket transport.
//!
//! The connection manager opens sockets through [`SocketTransport`] and
//! receives everything the socket produces as [`SocketEvent`]s on a channel.
//! [`TungsteniteTransport`] is the production implementation;
//! [`MockTransport`] lets tests drive the socket by hand.

use crate::error::{WsError, WsResult};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Everything needed to open one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRequest {
    /// Full `ws://` / `wss://` URL including the session key.
    pub url: String,
    /// Value of the `Authorization` header.
    pub auth_token: String,
    /// Epoch stamped on every event this socket produces.
    pub epoch: u64,
}

/// What happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEventKind {
    /// Text frame.
    Message(String),
    /// Binary frame (length only, the payload format is text).
    Binary(usize),
    /// Socket went away: close frame, read error or end of stream.
    Closed { reason: String },
}

/// Socket event tagged with the epoch of the socket that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub epoch: u64,
    pub kind: SocketEventKind,
}

/// Channel the transport pushes socket events into.
pub type SocketEventSink = mpsc::UnboundedSender<SocketEvent>;

/// Handle to an open socket. Closing (or dropping) it tears the socket down
/// without emitting a `Closed` event.
#[derive(Debug)]
pub struct SocketHandle {
    epoch: u64,
    cancel: CancellationToken,
}

impl SocketHandle {
    pub fn new(epoch: u64, cancel: CancellationToken) -> Self {
        Self { epoch, cancel }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Request local close.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens sockets.
pub trait SocketTransport: Send + Sync {
    /// Open a socket and start forwarding its events into `sink`.
    ///
    /// Resolves once the socket is open (handshake complete).
    fn open(&self, request: SocketRequest, sink: SocketEventSink)
        -> BoxFuture<'_, WsResult<SocketHandle>>;
}

/// `tokio-tungstenite` transport.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

impl SocketTransport for TungsteniteTransport {
    fn open(
        &self,
        request: SocketRequest,
        sink: SocketEventSink,
    ) -> BoxFuture<'_, WsResult<SocketHandle>> {
        Box::pin(async move {
            let mut client_request = request.url.as_str().into_client_request()?;
            let auth = HeaderValue::from_str(&request.auth_token)
                .map_err(|e| WsError::InvalidRequest(format!("Authorization header: {e}")))?;
            client_request.headers_mut().insert(AUTHORIZATION, auth);

            info!(epoch = request.epoch, "Opening socket");
            let (ws_stream, _response) =
                connect_async_tls_with_config(client_request, None, true, None).await?;

            let cancel = CancellationToken::new();
            tokio::spawn(pump(ws_stream, request.epoch, sink, cancel.clone()));

            Ok(SocketHandle::new(request.epoch, cancel))
        })
    }
}

/// Read loop of one socket. Runs until the socket closes or the handle is
/// cancelled.
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    epoch: u64,
    sink: SocketEventSink,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = ws_stream.split();

    let emit = |kind: SocketEventKind| {
        if sink.send(SocketEvent { epoch, kind }).is_err() {
            debug!(epoch, "Socket event receiver dropped");
            false
        } else {
            true
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(?e, epoch, "Failed to send Close frame");
                }
                debug!(epoch, "Socket closed locally");
                return;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !emit(SocketEventKind::Message(text)) {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if !emit(SocketEventKind::Binary(data.len())) {
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!(epoch, "Received ping, sending pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(?e, epoch, "Failed to send pong");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("code={} reason={}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        warn!(epoch, %reason, "Socket closed by server");
                        emit(SocketEventKind::Closed { reason });
                        return;
                    }
                    Some(Err(e)) => {
                        warn!(?e, epoch, "Socket read error");
                        emit(SocketEventKind::Closed { reason: e.to_string() });
                        return;
                    }
                    None => {
                        warn!(epoch, "Socket stream ended");
                        emit(SocketEventKind::Closed { reason: "stream ended".to_string() });
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

struct MockSocket {
    epoch: u64,
    sink: SocketEventSink,
    cancel: CancellationToken,
}

/// In-memory transport for tests.
#[derive(Default)]
pub struct MockTransport {
    /// Every open request, including failed ones.
    requests: Mutex<Vec<SocketRequest>>,
    sockets: Mutex<Vec<MockSocket>>,
    fail_opens: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent opens fail.
    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Get recorded open requests.
    pub fn requests(&self) -> Vec<SocketRequest> {
        self.requests.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Epoch of the newest socket that is still open.
    pub fn current_epoch(&self) -> Option<u64> {
        self.sockets
            .lock()
            .iter()
            .rev()
            .find(|s| !s.cancel.is_cancelled())
            .map(|s| s.epoch)
    }

    pub fn is_open(&self, epoch: u64) -> bool {
        self.sockets
            .lock()
            .iter()
            .any(|s| s.epoch == epoch && !s.cancel.is_cancelled())
    }

    /// Deliver a text frame on the newest open socket.
    pub fn push_text(&self, text: &str) -> bool {
        self.emit_current(SocketEventKind::Message(text.to_string()))
    }

    /// Simulate the server dropping the newest open socket.
    pub fn close_remote(&self, reason: &str) -> bool {
        let sockets = self.sockets.lock();
        let Some(socket) = sockets.iter().rev().find(|s| !s.cancel.is_cancelled()) else {
            return false;
        };
        socket.cancel.cancel();
        socket
            .sink
            .send(SocketEvent {
                epoch: socket.epoch,
                kind: SocketEventKind::Closed {
                    reason: reason.to_string(),
                },
            })
            .is_ok()
    }

    /// Deliver an arbitrary event stamped with `epoch`, open or not.
    pub fn emit_stale(&self, epoch: u64, kind: SocketEventKind) -> bool {
        let sockets = self.sockets.lock();
        match sockets.iter().find(|s| s.epoch == epoch) {
            Some(socket) => socket.sink.send(SocketEvent { epoch, kind }).is_ok(),
            None => false,
        }
    }

    fn emit_current(&self, kind: SocketEventKind) -> bool {
        let sockets = self.sockets.lock();
        match sockets.iter().rev().find(|s| !s.cancel.is_cancelled()) {
            Some(socket) => socket
                .sink
                .send(SocketEvent {
                    epoch: socket.epoch,
                    kind,
                })
                .is_ok(),
            None => false,
        }
    }
}

impl SocketTransport for MockTransport {
    fn open(
        &self,
        request: SocketRequest,
        sink: SocketEventSink,
    ) -> BoxFuture<'_, WsResult<SocketHandle>> {
        self.requests.lock().push(request.clone());
        let result = if self.fail_opens.load(Ordering::SeqCst) {
            Err(WsError::ConnectionFailed("mock open failure".to_string()))
        } else {
            let cancel = CancellationToken::new();
            self.sockets.lock().push(MockSocket {
                epoch: request.epoch,
                sink,
                cancel: cancel.clone(),
            });
            Ok(SocketHandle::new(request.epoch, cancel))
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(epoch: u64) -> SocketRequest {
        SocketRequest {
            url: "ws://localhost/portal/sse/get_ws?random_key=k".to_string(),
            auth_token: "Bearer t".to_string(),
            epoch,
        }
    }

    #[tokio::test]
    async fn test_mock_transport_delivers_to_newest_socket() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = transport.open(request(1), tx.clone()).await.unwrap();
        first.close();
        let _second = transport.open(request(2), tx).await.unwrap();

        assert_eq!(transport.current_epoch(), Some(2));
        assert!(transport.push_text("hello"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.epoch, 2);
        assert_eq!(event.kind, SocketEventKind::Message("hello".to_string()));
    }

    #[tokio::test]
    async fn test_dropping_handle_closes_socket() {
        let transport = MockTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let handle = transport.open(request(7), tx).await.unwrap();
        assert!(transport.is_open(7));
        drop(handle);
        assert!(!transport.is_open(7));
        assert_eq!(transport.current_epoch(), None);
    }

    #[tokio::test]
    async fn test_mock_transport_failure_is_recorded() {
        let transport = MockTransport::new();
        transport.set_fail_opens(true);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = transport.open(request(1), tx).await;
        assert!(matches!(result, Err(WsError::ConnectionFailed(_))));
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.current_epoch(), None);
    }

    #[tokio::test]
    async fn test_close_remote_emits_closed() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = transport.open(request(3), tx).await.unwrap();
        assert!(transport.close_remote("server restart"));
        assert!(!transport.is_open(3));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.kind,
            SocketEventKind::Closed {
                reason: "server restart".to_string()
            }
        );
    }
}
