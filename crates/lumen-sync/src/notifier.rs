//! Fan-out of changed wallets.
//!
//! After a push, balances are refreshed for the whole wallet list and only
//! the wallets named by the push are broadcast. A failed refresh broadcasts
//! nothing. The refresh itself runs outside the notifier; it only sees the
//! result.

use crate::error::SyncResult;
use lumen_core::{AccountId, Wallet};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{error, trace};

/// Event delivered to subscribers: wallets whose balances changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletsChanged {
    pub wallets: Vec<Wallet>,
}

/// Outcome of one refresh-and-publish pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Event sent.
    Published { wallets: usize, receivers: usize },
    /// Refresh succeeded but no pending account matched a wallet.
    NothingChanged,
    /// Refresh failed; nothing sent.
    Suppressed,
}

impl FanoutOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::NothingChanged => "empty",
            Self::Suppressed => "suppressed",
        }
    }
}

/// Wallets of `refreshed` whose key is in `pending`, in list order.
pub fn filter_changed(refreshed: &[Wallet], pending: &HashSet<AccountId>) -> Vec<Wallet> {
    refreshed
        .iter()
        .filter(|w| pending.contains(&w.public_key))
        .cloned()
        .collect()
}

/// Broadcasts [`WalletsChanged`] events.
#[derive(Debug, Clone)]
pub struct FanoutNotifier {
    tx: broadcast::Sender<WalletsChanged>,
}

impl FanoutNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletsChanged> {
        self.tx.subscribe()
    }

    /// Send an event. Returns the number of receivers reached.
    pub fn publish(&self, wallets: Vec<Wallet>) -> usize {
        match self.tx.send(WalletsChanged { wallets }) {
            Ok(n) => {
                trace!(receivers = n, "Wallet update broadcast");
                n
            }
            Err(_) => {
                trace!("No wallet update receivers");
                0
            }
        }
    }

    /// Publish the wallets of a finished refresh that are named in
    /// `pending`.
    ///
    /// Returns the refreshed list on success so the caller can keep the
    /// fresh balances.
    pub fn publish_refreshed(
        &self,
        refreshed: SyncResult<Vec<Wallet>>,
        pending: &HashSet<AccountId>,
    ) -> (FanoutOutcome, Option<Vec<Wallet>>) {
        let refreshed = match refreshed {
            Ok(refreshed) => refreshed,
            Err(e) => {
                error!(error = %e, pending = pending.len(), "Wallet refresh failed, update dropped");
                return (FanoutOutcome::Suppressed, None);
            }
        };

        let changed = filter_changed(&refreshed, pending);
        if changed.is_empty() {
            return (FanoutOutcome::NothingChanged, Some(refreshed));
        }

        let count = changed.len();
        let receivers = self.publish(changed);
        (
            FanoutOutcome::Published {
                wallets: count,
                receivers,
            },
            Some(refreshed),
        )
    }
}
