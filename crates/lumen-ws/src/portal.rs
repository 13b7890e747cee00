//! Portal registration endpoints.
//!
//! `listen_account`, `remove_account` and `remove_ws` tie accounts to the
//! socket identified by a session key. Calls return `'static` futures so the
//! connection manager can spawn them and forget about them.

use crate::error::{WsError, WsResult};
use crate::message::{AccountRequest, ConnectionRequest};
use crate::transport::BoxFuture;
use lumen_core::{AccountId, SessionKey};
use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Registers an account with the push socket.
pub const LISTEN_ACCOUNT_PATH: &str = "/portal/sse/listen_account";
/// Deregisters an account from the push socket.
pub const REMOVE_ACCOUNT_PATH: &str = "/portal/sse/remove_account";
/// Drops the server-side socket registration.
pub const REMOVE_WS_PATH: &str = "/portal/sse/remove_ws";

/// Portal calls scoped to a session key.
pub trait PortalApi: Send + Sync {
    fn listen_account(&self, key: SessionKey, account: AccountId)
        -> BoxFuture<'static, WsResult<()>>;

    fn remove_account(&self, key: SessionKey, account: AccountId)
        -> BoxFuture<'static, WsResult<()>>;

    fn remove_connection(&self, key: SessionKey) -> BoxFuture<'static, WsResult<()>>;
}

/// HTTP client for the portal.
#[derive(Debug, Clone)]
pub struct HttpPortalClient {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpPortalClient {
    /// Create a new portal client.
    ///
    /// # Arguments
    /// * `base_url` - Portal base URL (e.g., "https://portal.example.org")
    /// * `auth_token` - Value sent as the `Authorization` header
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> WsResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WsError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<B>(&self, path: &'static str, body: B) -> BoxFuture<'static, WsResult<()>>
    where
        B: Serialize + Send + 'static,
    {
        let client = self.client.clone();
        let url = format!("{}{}", self.base_url, path);
        let auth_token = self.auth_token.clone();

        Box::pin(async move {
            let response = client
                .post(&url)
                .header(AUTHORIZATION, auth_token)
                .json(&body)
                .send()
                .await
                .map_err(|e| WsError::HttpClient(format!("POST {path} failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(WsError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            debug!(path, "Portal call succeeded");
            Ok(())
        })
    }
}

impl PortalApi for HttpPortalClient {
    fn listen_account(
        &self,
        key: SessionKey,
        account: AccountId,
    ) -> BoxFuture<'static, WsResult<()>> {
        self.post(LISTEN_ACCOUNT_PATH, AccountRequest { key, account })
    }

    fn remove_account(
        &self,
        key: SessionKey,
        account: AccountId,
    ) -> BoxFuture<'static, WsResult<()>> {
        self.post(REMOVE_ACCOUNT_PATH, AccountRequest { key, account })
    }

    fn remove_connection(&self, key: SessionKey) -> BoxFuture<'static, WsResult<()>> {
        self.post(REMOVE_WS_PATH, ConnectionRequest { key })
    }
}

/// Recorded portal call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalCall {
    Listen { key: SessionKey, account: AccountId },
    RemoveAccount { key: SessionKey, account: AccountId },
    RemoveConnection { key: SessionKey },
}

/// Mock portal for testing.
///
/// Calls are recorded when they are issued, before the returned future is
/// polled.
#[derive(Debug, Default)]
pub struct MockPortal {
    calls: Mutex<Vec<PortalCall>>,
    failing_accounts: Mutex<HashSet<AccountId>>,
    fail_all: AtomicBool,
}

impl MockPortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make calls for `account` fail.
    pub fn fail_account(&self, account: AccountId) {
        self.failing_accounts.lock().insert(account);
    }

    /// Make every call fail.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Get recorded calls.
    pub fn calls(&self) -> Vec<PortalCall> {
        self.calls.lock().clone()
    }

    /// Accounts passed to `listen_account`, in call order.
    pub fn listened(&self) -> Vec<AccountId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                PortalCall::Listen { account, .. } => Some(account.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: PortalCall, account: Option<&AccountId>) -> BoxFuture<'static, WsResult<()>> {
        let fail = self.fail_all.load(Ordering::SeqCst)
            || account.is_some_and(|a| self.failing_accounts.lock().contains(a));
        self.calls.lock().push(call);
        Box::pin(async move {
            if fail {
                Err(WsError::HttpStatus {
                    status: 500,
                    body: "mock failure".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }
}

impl PortalApi for MockPortal {
    fn listen_account(
        &self,
        key: SessionKey,
        account: AccountId,
    ) -> BoxFuture<'static, WsResult<()>> {
        let target = account.clone();
        self.record(PortalCall::Listen { key, account }, Some(&target))
    }

    fn remove_account(
        &self,
        key: SessionKey,
        account: AccountId,
    ) -> BoxFuture<'static, WsResult<()>> {
        let target = account.clone();
        self.record(PortalCall::RemoveAccount { key, account }, Some(&target))
    }

    fn remove_connection(&self, key: SessionKey) -> BoxFuture<'static, WsResult<()>> {
        self.record(PortalCall::RemoveConnection { key }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            HttpPortalClient::new("https://portal.example.org/", "t", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url(), "https://portal.example.org");
    }

    #[tokio::test]
    async fn test_mock_portal_records_before_poll() {
        let portal = MockPortal::new();
        let key = SessionKey::from_string("k".to_string());

        let fut = portal.listen_account(key.clone(), AccountId::from_raw("GA"));
        assert_eq!(portal.listened(), vec![AccountId::from_raw("GA")]);
        assert!(fut.await.is_ok());

        portal.remove_connection(key.clone()).await.unwrap();
        assert_eq!(
            portal.calls().last(),
            Some(&PortalCall::RemoveConnection { key })
        );
    }

    #[test]
    fn test_mock_portal_failing_account() {
        let portal = MockPortal::new();
        let key = SessionKey::from_string("k".to_string());
        portal.fail_account(AccountId::from_raw("GBAD"));

        let bad =
            tokio_test::block_on(portal.listen_account(key.clone(), AccountId::from_raw("GBAD")));
        tokio_test::assert_ok!(tokio_test::block_on(
            portal.listen_account(key, AccountId::from_raw("GOOD"))
        ));

        assert!(matches!(bad, Err(WsError::HttpStatus { status: 500, .. })));
        assert_eq!(portal.calls().len(), 2);
    }
}
