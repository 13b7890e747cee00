//! Account balance lookups against a Horizon server.

use crate::error::{HorizonError, HorizonResult};
use futures_util::future::try_join_all;
use lumen_core::{AccountId, AssetCode, Balance, Wallet};
use lumen_sync::{SyncResult, WalletDetailService};
use lumen_ws::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for Horizon requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /accounts/{id}` response, reduced to what we read.
#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset_type: String,
    asset_code: Option<String>,
    asset_issuer: Option<String>,
    balance: String,
}

impl RawBalance {
    fn into_balance(self) -> HorizonResult<Option<Balance>> {
        // Liquidity pool shares carry no asset code; wallets don't show them.
        if self.asset_type == "liquidity_pool_shares" {
            return Ok(None);
        }
        let asset = AssetCode::from_horizon(
            &self.asset_type,
            self.asset_code.as_deref(),
            self.asset_issuer.as_deref(),
        )?;
        Ok(Some(Balance::parse(asset, &self.balance)?))
    }
}

fn parse_balances(body: &str) -> HorizonResult<Vec<Balance>> {
    let response: AccountResponse = serde_json::from_str(body)?;
    let mut balances = Vec::with_capacity(response.balances.len());
    for raw in response.balances {
        if let Some(balance) = raw.into_balance()? {
            balances.push(balance);
        }
    }
    Ok(balances)
}

/// Horizon client.
#[derive(Debug, Clone)]
pub struct HorizonClient {
    client: Client,
    base_url: String,
}

impl HorizonClient {
    /// Create a client for the Horizon server at `base_url`
    /// (e.g. "https://horizon.stellar.org").
    pub fn new(base_url: impl Into<String>) -> HorizonResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> HorizonResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HorizonError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn account_url(&self, account: &AccountId) -> String {
        format!("{}/accounts/{}", self.base_url, account)
    }

    /// Fetch the balances of one account.
    ///
    /// An account that does not exist on the ledger yet has no balances.
    pub async fn fetch_balances(&self, account: &AccountId) -> HorizonResult<Vec<Balance>> {
        let url = self.account_url(account);
        debug!(%url, "Fetching account balances");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HorizonError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(account = %account, "Account not funded");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(HorizonError::HttpStatus {
                status: status.as_u16(),
                account: account.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| HorizonError::HttpClient(format!("Failed to read response: {e}")))?;
        parse_balances(&body)
    }

    /// Fetch all wallets concurrently. The first failure fails the whole
    /// refresh; order is preserved.
    async fn refresh(&self, wallets: Vec<Wallet>) -> HorizonResult<Vec<Wallet>> {
        let refreshed = try_join_all(wallets.into_iter().map(|wallet| async move {
            let balances = self.fetch_balances(&wallet.public_key).await?;
            Ok::<_, HorizonError>(wallet.with_balances(balances))
        }))
        .await?;
        info!(wallets = refreshed.len(), "Wallet balances refreshed");
        Ok(refreshed)
    }
}

impl WalletDetailService for HorizonClient {
    fn wallet_details(&self, wallets: Vec<Wallet>) -> BoxFuture<'_, SyncResult<Vec<Wallet>>> {
        Box::pin(async move { Ok(self.refresh(wallets).await?) })
    }
}
