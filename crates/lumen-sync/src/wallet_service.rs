//! Wallet detail service: refreshes balances for a wallet list.

use crate::error::{SyncError, SyncResult};
use lumen_core::{AccountId, Balance, Wallet};
use lumen_ws::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Fetches up-to-date balances.
pub trait WalletDetailService: Send + Sync {
    /// Return `wallets` with refreshed balances, in the same order.
    ///
    /// Fails as a whole; a partial result is never returned.
    fn wallet_details(&self, wallets: Vec<Wallet>) -> BoxFuture<'_, SyncResult<Vec<Wallet>>>;
}

/// Mock detail service for testing.
#[derive(Debug, Default)]
pub struct MockWalletDetails {
    balances: Mutex<HashMap<AccountId, Vec<Balance>>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockWalletDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balances returned for `account` from now on.
    pub fn set_balances(&self, account: AccountId, balances: Vec<Balance>) {
        self.balances.lock().insert(account, balances);
    }

    /// Make subsequent fetches fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold every fetch for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WalletDetailService for MockWalletDetails {
    fn wallet_details(&self, wallets: Vec<Wallet>) -> BoxFuture<'_, SyncResult<Vec<Wallet>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::DetailFetch("mock failure".to_string()));
            }
            let balances = self.balances.lock();
            Ok(wallets
                .into_iter()
                .map(|w| {
                    let refreshed = balances.get(&w.public_key).cloned().unwrap_or_default();
                    w.with_balances(refreshed)
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::AssetCode;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_refreshes_in_order() {
        let mock = MockWalletDetails::new();
        mock.set_balances(
            AccountId::from_raw("GB"),
            vec![Balance::new(AssetCode::Native, dec!(5))],
        );

        let wallets = vec![
            Wallet::new(1, "a", AccountId::from_raw("GA")),
            Wallet::new(2, "b", AccountId::from_raw("GB")),
        ];
        let refreshed = mock.wallet_details(wallets).await.unwrap();

        assert_eq!(refreshed[0].public_key.as_str(), "GA");
        assert!(!refreshed[0].is_funded());
        assert_eq!(refreshed[1].native_balance(), Some(dec!(5)));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_mock_failure() {
        let mock = MockWalletDetails::new();
        mock.set_fail(true);
        let result = tokio_test::block_on(mock.wallet_details(vec![]));
        assert!(matches!(result, Err(SyncError::DetailFetch(_))));
    }
}
