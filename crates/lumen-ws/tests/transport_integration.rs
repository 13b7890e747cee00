//! Integration tests for `TungsteniteTransport` against a local socket server.

use futures_util::{SinkExt, StreamExt};
use lumen_ws::{SocketEventKind, SocketRequest, SocketTransport, TungsteniteTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// What the server saw during the handshake.
#[derive(Debug, Default, Clone)]
struct Handshake {
    uri: String,
    authorization: Option<String>,
}

/// What the server does once the client is connected.
enum Script {
    /// Send the frames, then close from the server side.
    SendThenClose(Vec<String>),
    /// Send the frames, then wait for the client to close and report it.
    SendThenAwaitClose(Vec<String>, oneshot::Sender<()>),
}

async fn spawn_server(script: Script) -> (SocketAddr, Arc<Mutex<Handshake>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshake = Arc::new(Mutex::new(Handshake::default()));
    let seen = handshake.clone();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();

        let (uri_tx, uri_rx) = std::sync::mpsc::channel();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = uri_tx.send((req.uri().to_string(), auth));
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        if let Ok((uri, authorization)) = uri_rx.recv() {
            *seen.lock().await = Handshake { uri, authorization };
        }

        let (mut write, mut read) = ws.split();
        match script {
            Script::SendThenClose(frames) => {
                for frame in frames {
                    write.send(Message::Text(frame)).await.unwrap();
                }
                write.send(Message::Close(None)).await.unwrap();
            }
            Script::SendThenAwaitClose(frames, closed_tx) => {
                for frame in frames {
                    write.send(Message::Text(frame)).await.unwrap();
                }
                while let Some(Ok(msg)) = read.next().await {
                    if msg.is_close() {
                        let _ = closed_tx.send(());
                        break;
                    }
                }
            }
        }
    });

    (addr, handshake)
}

fn request(addr: SocketAddr, epoch: u64) -> SocketRequest {
    SocketRequest {
        url: format!("ws://{addr}/portal/sse/get_ws?random_key=abc123"),
        auth_token: "Bearer test-jwt".to_string(),
        epoch,
    }
}

#[tokio::test]
async fn test_open_sends_auth_and_forwards_pushes() {
    let push = "{\"account\":\"GABC\"}\n".to_string();
    let (addr, handshake) = spawn_server(Script::SendThenClose(vec![push.clone()])).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let transport = TungsteniteTransport::new();
    let handle = transport.open(request(addr, 5), tx).await.unwrap();
    assert_eq!(handle.epoch(), 5);

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.epoch, 5);
    assert_eq!(event.kind, SocketEventKind::Message(push));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event.kind, SocketEventKind::Closed { .. }));

    let seen = handshake.lock().await.clone();
    assert_eq!(seen.uri, "/portal/sse/get_ws?random_key=abc123");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer test-jwt"));
}

#[tokio::test]
async fn test_local_close_sends_close_frame() {
    let (closed_tx, closed_rx) = oneshot::channel();
    let (addr, _handshake) = spawn_server(Script::SendThenAwaitClose(vec![], closed_tx)).await;
    let (tx, _rx) = mpsc::unbounded_channel();

    let transport = TungsteniteTransport::new();
    let handle = transport.open(request(addr, 1), tx).await.unwrap();
    handle.close();

    tokio::time::timeout(Duration::from_secs(5), closed_rx)
        .await
        .expect("server should see a close frame")
        .unwrap();
}

#[tokio::test]
async fn test_open_fails_without_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, _rx) = mpsc::unbounded_channel();
    let transport = TungsteniteTransport::new();
    assert!(transport.open(request(addr, 1), tx).await.is_err());
}
