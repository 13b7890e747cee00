//! Update reconciliation.
//!
//! Keeps three pieces of state:
//! - the current wallet list, as last supplied by the application or
//!   refreshed after a push
//! - the snapshot, the list the open socket has been told to listen to
//! - the pending update set, account ids from the last push
//!
//! Wallets are assumed to be appended, never inserted mid-list, so a growing
//! list only needs listens for its tail.

use lumen_core::{AccountId, Wallet};
use lumen_ws::parse_account_ids;
use std::collections::HashSet;
use tracing::debug;

/// Accounts that need a `listen_account` call when the wallet list goes from
/// `previous` to `new`.
///
/// - same length: nothing
/// - longer: the appended tail `[previous.len(), new.len())`
/// - shorter, or no previous list: every wallet in `new`
pub fn plan_listens(previous: Option<&[Wallet]>, new: &[Wallet]) -> Vec<AccountId> {
    let start = match previous {
        Some(prev) if prev.len() == new.len() => return Vec::new(),
        Some(prev) if prev.len() < new.len() => prev.len(),
        _ => 0,
    };
    new[start..].iter().map(|w| w.public_key.clone()).collect()
}

#[derive(Debug, Default)]
pub struct Reconciler {
    wallets: Option<Vec<Wallet>>,
    snapshot: Option<Vec<Wallet>>,
    pending: HashSet<AccountId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wallet list supplied by the application.
    ///
    /// Returns the accounts to listen to. While disconnected nothing is
    /// listened to and the snapshot stays empty; the list is kept for the
    /// next connect.
    pub fn wallets_changed(&mut self, wallets: Vec<Wallet>, connected: bool) -> Vec<AccountId> {
        let listens = if connected {
            let listens = plan_listens(self.snapshot.as_deref(), &wallets);
            self.snapshot = Some(wallets.clone());
            listens
        } else {
            Vec::new()
        };
        debug!(
            wallets = wallets.len(),
            listens = listens.len(),
            connected,
            "Wallet list changed"
        );
        self.wallets = Some(wallets);
        listens
    }

    /// A new socket is open. Drops the snapshot and any pending ids, then
    /// returns every known wallet for listening.
    pub fn on_connected(&mut self) -> Vec<AccountId> {
        self.snapshot = None;
        self.pending.clear();
        match &self.wallets {
            Some(wallets) => {
                let listens = plan_listens(None, wallets);
                self.snapshot = Some(wallets.clone());
                listens
            }
            None => Vec::new(),
        }
    }

    /// The socket is gone.
    pub fn on_disconnected(&mut self) {
        self.snapshot = None;
        self.pending.clear();
    }

    /// Replace the pending set with the ids carried by a push payload.
    pub fn record_push(&mut self, payload: &str) -> &HashSet<AccountId> {
        self.pending = parse_account_ids(payload).into_iter().collect();
        &self.pending
    }

    /// Take the pending set, leaving it empty.
    pub fn take_pending(&mut self) -> HashSet<AccountId> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &HashSet<AccountId> {
        &self.pending
    }

    pub fn current_wallets(&self) -> Option<&[Wallet]> {
        self.wallets.as_deref()
    }

    /// Store a refreshed wallet list without touching the snapshot.
    ///
    /// Ignored when the current list changed since the refresh started, so a
    /// slow refresh never overwrites a newer list. Returns whether it was
    /// stored.
    pub fn apply_refreshed(&mut self, refreshed: Vec<Wallet>) -> bool {
        let same_wallets = self.wallets.as_ref().is_some_and(|current| {
            current.len() == refreshed.len()
                && current
                    .iter()
                    .zip(&refreshed)
                    .all(|(a, b)| a.public_key == b.public_key)
        });
        if same_wallets {
            self.wallets = Some(refreshed);
        }
        same_wallets
    }

    pub fn snapshot(&self) -> Option<&[Wallet]> {
        self.snapshot.as_deref()
    }
}
