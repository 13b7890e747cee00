//! Live wallet balance synchronization over the Lumen push socket.
//!
//! A single actor task owns the socket connection, the subscriber registry,
//! the cached wallet snapshot and the pending update set:
//! - consumers subscribe and request updates through a [`SyncHandle`]
//! - the socket opens on the first request and closes when nobody needs it
//! - pushes are reconciled against the wallet list and refreshed balances of
//!   the changed wallets are broadcast to every subscriber

pub mod error;
pub mod notifier;
pub mod reachability;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod wallet_service;

pub use error::{SyncError, SyncResult};
pub use notifier::{filter_changed, FanoutNotifier, FanoutOutcome, WalletsChanged};
pub use reachability::{Reachability, ReachabilityAction, ReachabilityTracker};
pub use reconciler::{plan_listens, Reconciler};
pub use registry::{ConsumerToken, RequestOutcome, SubscriptionRegistry, TokenAllocator};
pub use service::{Subscription, SyncConfig, SyncHandle, SyncService, SyncStatus};
pub use wallet_service::{MockWalletDetails, WalletDetailService};
