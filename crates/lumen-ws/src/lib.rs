//! Push socket and portal registration client for Lumen wallet updates.
//!
//! Provides:
//! - Socket lifecycle with per-connection session keys and epochs
//! - Fire-and-forget `listen_account` / `remove_account` / `remove_ws` calls
//! - Parsing of the account push payload
//! - Transport and portal traits with in-memory mocks for tests

pub mod connection;
pub mod error;
pub mod message;
pub mod portal;
pub mod transport;

pub use connection::{websocket_url, ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use message::{parse_account_ids, AccountRequest, ConnectionRequest};
pub use portal::{HttpPortalClient, MockPortal, PortalApi, PortalCall};
pub use transport::{
    BoxFuture, MockTransport, SocketEvent, SocketEventKind, SocketEventSink, SocketHandle,
    SocketRequest, SocketTransport, TungsteniteTransport,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any socket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
