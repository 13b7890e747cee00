//! Push socket connection manager.
//!
//! Owns the socket lifecycle and the session key. The manager is not shared:
//! the sync service owns it and calls it from a single task, so every method
//! checks state before acting and repeated `connect` / `disconnect` calls are
//! no-ops.

use crate::error::{WsError, WsResult};
use crate::portal::PortalApi;
use crate::transport::{BoxFuture, SocketEventSink, SocketHandle, SocketRequest, SocketTransport};
use lumen_core::{AccountId, SessionKey};
use lumen_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Socket endpoint, relative to the portal base URL.
pub const SOCKET_PATH: &str = "/portal/sse/get_ws";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Portal base URL (http/https; rewritten to ws/wss for the socket).
    pub base_url: String,
    /// Value of the `Authorization` header.
    pub auth_token: String,
    /// Upper bound on the socket handshake.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: String::new(),
            connect_timeout_ms: 10_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rewrite an http(s) base URL to the matching ws(s) scheme.
pub fn websocket_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    }
}

/// Push socket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    transport: Arc<dyn SocketTransport>,
    portal: Arc<dyn PortalApi>,
    events_tx: SocketEventSink,
    state: ConnectionState,
    /// Defined iff `state == Connected`.
    session_key: Option<SessionKey>,
    socket: Option<SocketHandle>,
    /// Epoch of the newest connect attempt.
    epoch: u64,
}

impl ConnectionManager {
    /// Create a new connection manager.
    ///
    /// Events of every socket it opens are sent to `events_tx`.
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn SocketTransport>,
        portal: Arc<dyn PortalApi>,
        events_tx: SocketEventSink,
    ) -> Self {
        Self {
            config,
            transport,
            portal,
            events_tx,
            state: ConnectionState::Disconnected,
            session_key: None,
            socket: None,
            epoch: 0,
        }
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Session key of the open socket.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether an event stamped with `epoch` belongs to the open socket.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.is_connected() && epoch == self.epoch
    }

    /// Socket URL for a session key.
    pub fn socket_url(&self, key: &SessionKey) -> String {
        format!(
            "{}{}?random_key={}",
            websocket_url(&self.config.base_url),
            SOCKET_PATH,
            key
        )
    }

    /// Open the socket.
    ///
    /// Returns `Ok(false)` without doing anything when a socket is already
    /// open, `Ok(true)` when a new socket was opened.
    pub async fn connect(&mut self) -> WsResult<bool> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "Connect skipped");
            return Ok(false);
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let key = SessionKey::generate();
        let request = SocketRequest {
            url: self.socket_url(&key),
            auth_token: self.config.auth_token.clone(),
            epoch,
        };

        self.set_state(ConnectionState::Connecting);
        info!(epoch, "Connecting push socket");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let opened = tokio::time::timeout(
            timeout,
            self.transport.open(request, self.events_tx.clone()),
        )
        .await
        .unwrap_or_else(|_| Err(WsError::Timeout(self.config.connect_timeout_ms)));

        match opened {
            Ok(handle) => {
                self.socket = Some(handle);
                self.session_key = Some(key);
                self.set_state(ConnectionState::Connected);
                Metrics::socket_connected();
                info!(epoch, "Push socket connected");
                Ok(true)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Metrics::socket_connect_failed();
                Err(e)
            }
        }
    }

    /// Close the socket.
    ///
    /// Sends a best-effort `remove_ws` for the current session key, then tears
    /// the socket down. Returns `false` when nothing was open.
    pub fn disconnect(&mut self) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }

        if let Some(key) = self.session_key.take() {
            self.spawn_portal_call(
                "remove_ws",
                None,
                self.portal.remove_connection(key),
            );
        }
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.set_state(ConnectionState::Disconnected);
        Metrics::socket_disconnected("local");
        info!(epoch = self.epoch, "Push socket disconnected");
        true
    }

    /// Socket reported it went away.
    ///
    /// Returns `false` for events from a superseded socket, which are ignored.
    pub fn handle_closed(&mut self, epoch: u64, reason: &str) -> bool {
        if !self.is_current(epoch) {
            debug!(epoch, current = self.epoch, "Ignoring close from stale socket");
            return false;
        }

        warn!(epoch, %reason, "Push socket lost");
        self.session_key = None;
        self.socket = None;
        self.set_state(ConnectionState::Disconnected);
        Metrics::socket_disconnected("remote");
        true
    }

    /// Register `account` for pushes on the open socket (fire-and-forget).
    ///
    /// Returns `false` without calling the portal when not connected.
    pub fn listen_account(&self, account: &AccountId) -> bool {
        let Some(key) = self.session_key.clone() else {
            return false;
        };
        self.spawn_portal_call(
            "listen_account",
            Some(account.clone()),
            self.portal.listen_account(key, account.clone()),
        );
        true
    }

    /// Deregister `account` from the open socket (fire-and-forget).
    pub fn remove_account(&self, account: &AccountId) -> bool {
        let Some(key) = self.session_key.clone() else {
            return false;
        };
        self.spawn_portal_call(
            "remove_account",
            Some(account.clone()),
            self.portal.remove_account(key, account.clone()),
        );
        true
    }

    fn spawn_portal_call(
        &self,
        call: &'static str,
        account: Option<AccountId>,
        fut: BoxFuture<'static, WsResult<()>>,
    ) {
        tokio::spawn(async move {
            let account = account.map(|a| a.to_string()).unwrap_or_default();
            match fut.await {
                Ok(()) => debug!(call, %account, "Portal call completed"),
                Err(e) => {
                    warn!(call, %account, error = %e, "Portal call failed");
                    Metrics::portal_call_failed(call);
                }
            }
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        Metrics::socket_state_set(state.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{MockPortal, PortalCall};
    use crate::transport::MockTransport;
    use tokio::sync::mpsc;

    fn manager() -> (ConnectionManager, Arc<MockTransport>, Arc<MockPortal>) {
        let transport = Arc::new(MockTransport::new());
        let portal = Arc::new(MockPortal::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = ConnectionConfig {
            base_url: "https://portal.example.org/".to_string(),
            auth_token: "Bearer jwt".to_string(),
            ..Default::default()
        };
        let mgr = ConnectionManager::new(config, transport.clone(), portal.clone(), tx);
        (mgr, transport, portal)
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(websocket_url("https://a.org/"), "wss://a.org");
        assert_eq!(websocket_url("http://a.org"), "ws://a.org");
        assert_eq!(websocket_url("ws://a.org"), "ws://a.org");
    }

    #[tokio::test]
    async fn test_connect_embeds_key_and_auth() {
        let (mut mgr, transport, _portal) = manager();

        assert!(mgr.connect().await.unwrap());
        assert_eq!(mgr.state(), ConnectionState::Connected);

        let key = mgr.session_key().unwrap().clone();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            format!("wss://portal.example.org/portal/sse/get_ws?random_key={key}")
        );
        assert_eq!(requests[0].auth_token, "Bearer jwt");
        assert_eq!(requests[0].epoch, 1);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (mut mgr, transport, _portal) = manager();

        assert!(mgr.connect().await.unwrap());
        let key = mgr.session_key().cloned();
        assert!(!mgr.connect().await.unwrap());

        assert_eq!(transport.open_count(), 1);
        assert_eq!(mgr.session_key().cloned(), key);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let (mut mgr, transport, _portal) = manager();
        transport.set_fail_opens(true);

        assert!(mgr.connect().await.is_err());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.session_key().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_removes_ws_and_clears_key() {
        let (mut mgr, transport, portal) = manager();
        mgr.connect().await.unwrap();
        let key = mgr.session_key().unwrap().clone();

        assert!(mgr.disconnect());
        assert!(!mgr.disconnect());

        assert!(mgr.session_key().is_none());
        assert_eq!(transport.current_epoch(), None);
        assert_eq!(portal.calls(), vec![PortalCall::RemoveConnection { key }]);
    }

    #[tokio::test]
    async fn test_reconnect_generates_new_key() {
        let (mut mgr, _transport, _portal) = manager();
        mgr.connect().await.unwrap();
        let first = mgr.session_key().unwrap().clone();
        mgr.disconnect();
        mgr.connect().await.unwrap();

        assert_ne!(mgr.session_key().unwrap(), &first);
        assert_eq!(mgr.epoch(), 2);
    }

    #[tokio::test]
    async fn test_listen_requires_connection() {
        let (mut mgr, _transport, portal) = manager();
        let account = AccountId::from_raw("GA");

        assert!(!mgr.listen_account(&account));
        assert!(portal.calls().is_empty());

        mgr.connect().await.unwrap();
        let key = mgr.session_key().unwrap().clone();
        assert!(mgr.listen_account(&account));
        assert!(mgr.remove_account(&account));
        assert_eq!(
            portal.calls(),
            vec![
                PortalCall::Listen {
                    key: key.clone(),
                    account: account.clone()
                },
                PortalCall::RemoveAccount { key, account },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_listen_leaves_other_accounts_and_socket() {
        let (mut mgr, _transport, portal) = manager();
        portal.fail_account(AccountId::from_raw("GB"));
        mgr.connect().await.unwrap();

        for key in ["GA", "GB", "GC"] {
            assert!(mgr.listen_account(&AccountId::from_raw(key)));
        }
        tokio::task::yield_now().await;

        assert!(mgr.is_connected());
        assert_eq!(
            portal.listened(),
            vec![
                AccountId::from_raw("GA"),
                AccountId::from_raw("GB"),
                AccountId::from_raw("GC"),
            ]
        );

        portal.set_fail_all(true);
        assert!(mgr.disconnect());
        assert!(matches!(
            portal.calls().last(),
            Some(PortalCall::RemoveConnection { .. })
        ));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_close_ignored() {
        let (mut mgr, _transport, _portal) = manager();
        mgr.connect().await.unwrap();
        mgr.disconnect();
        mgr.connect().await.unwrap();

        assert!(!mgr.handle_closed(1, "old socket"));
        assert!(mgr.is_connected());

        assert!(mgr.handle_closed(2, "server gone"));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.session_key().is_none());
    }
}
