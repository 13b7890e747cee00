//! Sync service actor.
//!
//! [`SyncService`] runs as one task and is the only owner of the connection
//! manager, the subscriber registry and the reconciler. Everything else talks
//! to it through a [`SyncHandle`] or a [`Subscription`], which send commands
//! over an unbounded channel. Socket events arrive on a second channel and
//! are drained before commands, so a status query observes every socket
//! event delivered before it.
//!
//! Balance refreshes run on their own tasks and report back on a third
//! channel, so a slow wallet-detail service never holds up connection
//! management. A result is applied only if the socket it was started for is
//! still the current one.

use crate::error::{SyncError, SyncResult};
use crate::notifier::{FanoutNotifier, FanoutOutcome, WalletsChanged};
use crate::reachability::{Reachability, ReachabilityAction, ReachabilityTracker};
use crate::reconciler::Reconciler;
use crate::registry::{ConsumerToken, RequestOutcome, SubscriptionRegistry, TokenAllocator};
use crate::wallet_service::WalletDetailService;
use lumen_core::{AccountId, SessionKey, Wallet};
use lumen_telemetry::Metrics;
use lumen_ws::{
    ConnectionConfig, ConnectionManager, ConnectionState, PortalApi, SocketEvent,
    SocketEventKind, SocketTransport,
};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Sync service configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Socket and portal settings.
    pub connection: ConnectionConfig,
    /// Broadcast buffer for wallet update events. Slow subscribers lag
    /// beyond this.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            event_buffer: 64,
        }
    }
}

/// Point-in-time view of the service state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub connection: ConnectionState,
    pub session_key: Option<SessionKey>,
    pub epoch: u64,
    pub subscribers: usize,
    pub active_subscribers: usize,
    /// Length of the cached snapshot, `None` when there is none.
    pub snapshot_len: Option<usize>,
    pub pending_updates: usize,
    /// Balance refreshes started and not yet reported back.
    pub refreshes_in_flight: usize,
    pub reachability: Option<Reachability>,
}

#[derive(Debug)]
enum SyncCommand {
    Subscribe(ConsumerToken),
    RequestUpdates(ConsumerToken),
    Unsubscribe(ConsumerToken),
    Reachability(Reachability),
    WalletsChanged(Vec<Wallet>),
    StopListening(AccountId),
    Status(oneshot::Sender<SyncStatus>),
    Shutdown,
}

/// Result of a balance refresh, tagged with the socket epoch it ran for.
#[derive(Debug)]
struct RefreshDone {
    epoch: u64,
    pending: HashSet<AccountId>,
    result: SyncResult<Vec<Wallet>>,
}

/// Sync service actor.
pub struct SyncService {
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    reconciler: Reconciler,
    notifier: FanoutNotifier,
    reachability: ReachabilityTracker,
    details: Arc<dyn WalletDetailService>,
    commands: mpsc::UnboundedReceiver<SyncCommand>,
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    refresh_tx: mpsc::UnboundedSender<RefreshDone>,
    refreshes: mpsc::UnboundedReceiver<RefreshDone>,
    refreshes_in_flight: usize,
}

impl SyncService {
    /// Create the service and a handle to it. Nothing happens until
    /// [`SyncService::run`] is polled.
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn SocketTransport>,
        portal: Arc<dyn PortalApi>,
        details: Arc<dyn WalletDetailService>,
    ) -> (Self, SyncHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (socket_tx, socket_events) = mpsc::unbounded_channel();
        let (refresh_tx, refreshes) = mpsc::unbounded_channel();
        let notifier = FanoutNotifier::new(config.event_buffer);

        let service = Self {
            connection: ConnectionManager::new(config.connection, transport, portal, socket_tx),
            registry: SubscriptionRegistry::new(),
            reconciler: Reconciler::new(),
            notifier: notifier.clone(),
            reachability: ReachabilityTracker::new(),
            details,
            commands,
            socket_events,
            refresh_tx,
            refreshes,
            refreshes_in_flight: 0,
        };
        let handle = SyncHandle {
            commands: command_tx,
            notifier,
            tokens: TokenAllocator::new(),
        };
        (service, handle)
    }

    /// Create the service and run it on a new task.
    pub fn spawn(
        config: SyncConfig,
        transport: Arc<dyn SocketTransport>,
        portal: Arc<dyn PortalApi>,
        details: Arc<dyn WalletDetailService>,
    ) -> (SyncHandle, tokio::task::JoinHandle<()>) {
        let (service, handle) = Self::new(config, transport, portal, details);
        (handle, tokio::spawn(service.run()))
    }

    /// Process commands and socket events until shutdown or until every
    /// handle and subscription is gone.
    pub async fn run(mut self) {
        info!("Sync service started");

        loop {
            tokio::select! {
                biased;

                Some(event) = self.socket_events.recv() => {
                    self.handle_socket_event(event);
                }

                Some(done) = self.refreshes.recv() => {
                    self.handle_refresh_done(done);
                }

                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle_command(cmd).await.is_break() {
                        break;
                    }
                }
            }
        }

        self.disconnect();
        info!("Sync service stopped");
    }

    async fn handle_command(&mut self, cmd: SyncCommand) -> ControlFlow<()> {
        match cmd {
            SyncCommand::Subscribe(token) => {
                self.registry.register(token);
                Metrics::subscribers(self.registry.len());
            }
            SyncCommand::RequestUpdates(token) => match self.registry.request_updates(token) {
                RequestOutcome::Initialize => {
                    debug!(%token, "Consumer requested updates");
                    self.connect().await;
                }
                RequestOutcome::AlreadyInitialized => {}
                RequestOutcome::Unknown => {
                    warn!(%token, "Update request from unregistered consumer");
                }
            },
            SyncCommand::Unsubscribe(token) => {
                self.registry.remove(token);
                Metrics::subscribers(self.registry.len());
                if !self.registry.has_active() {
                    self.disconnect();
                }
            }
            SyncCommand::Reachability(status) => {
                match self.reachability.observe(status) {
                    ReachabilityAction::Reconnect if self.registry.has_active() => {
                        info!("Network reachable again, reconnecting");
                        self.connect().await;
                    }
                    ReachabilityAction::Disconnect => {
                        info!("Network unreachable, dropping socket");
                        self.disconnect();
                    }
                    ReachabilityAction::Reconnect | ReachabilityAction::None => {}
                }
            }
            SyncCommand::WalletsChanged(wallets) => {
                let listens = self
                    .reconciler
                    .wallets_changed(wallets, self.connection.is_connected());
                self.listen_all(&listens);
            }
            SyncCommand::StopListening(account) => {
                if !self.connection.remove_account(&account) {
                    debug!(account = %account, "Not connected, nothing to remove");
                }
            }
            SyncCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            SyncCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        if !self.connection.is_current(event.epoch) {
            debug!(
                epoch = event.epoch,
                current = self.connection.epoch(),
                "Dropping event from stale socket"
            );
            return;
        }

        match event.kind {
            SocketEventKind::Message(text) => {
                debug!(%text, "Push received");
                let accounts = self.reconciler.record_push(&text).len();
                Metrics::push_received(accounts);
                self.start_refresh(event.epoch);
            }
            SocketEventKind::Binary(len) => {
                debug!(len, "Ignoring binary frame");
            }
            SocketEventKind::Closed { reason } => {
                if self.connection.handle_closed(event.epoch, &reason) {
                    self.reconciler.on_disconnected();
                }
            }
        }
    }

    async fn connect(&mut self) {
        match self.connection.connect().await {
            Ok(true) => {
                let listens = self.reconciler.on_connected();
                self.listen_all(&listens);
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "Push socket connect failed");
            }
        }
    }

    fn disconnect(&mut self) {
        if self.connection.disconnect() {
            self.reconciler.on_disconnected();
        }
    }

    fn listen_all(&self, accounts: &[AccountId]) {
        for account in accounts {
            if !self.connection.listen_account(account) {
                debug!(account = %account, "Not connected, listen skipped");
            }
        }
    }

    /// Refresh every current wallet on a separate task. The pending set is
    /// handed to that task and cleared here.
    fn start_refresh(&mut self, epoch: u64) {
        let pending = self.reconciler.take_pending();
        let Some(wallets) = self.reconciler.current_wallets().map(<[Wallet]>::to_vec) else {
            debug!("No wallet list yet, push ignored");
            Metrics::fanout(FanoutOutcome::NothingChanged.as_str());
            return;
        };

        let details = Arc::clone(&self.details);
        let done_tx = self.refresh_tx.clone();
        self.refreshes_in_flight += 1;
        debug!(epoch, wallets = wallets.len(), pending = pending.len(), "Refreshing balances");
        tokio::spawn(async move {
            let result = details.wallet_details(wallets).await;
            let _ = done_tx.send(RefreshDone {
                epoch,
                pending,
                result,
            });
        });
    }

    fn handle_refresh_done(&mut self, done: RefreshDone) {
        self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
        if !self.connection.is_current(done.epoch) {
            debug!(
                epoch = done.epoch,
                current = self.connection.epoch(),
                "Dropping refresh for a closed socket"
            );
            Metrics::fanout("stale");
            return;
        }

        let (outcome, refreshed) = self.notifier.publish_refreshed(done.result, &done.pending);
        if let Some(refreshed) = refreshed {
            if !self.reconciler.apply_refreshed(refreshed) {
                debug!("Wallet list changed during refresh, balances not stored");
            }
        }

        Metrics::fanout(outcome.as_str());
        if let FanoutOutcome::Published { wallets, receivers } = outcome {
            info!(wallets, receivers, "Published wallet update");
        }
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            connection: self.connection.state(),
            session_key: self.connection.session_key().cloned(),
            epoch: self.connection.epoch(),
            subscribers: self.registry.len(),
            active_subscribers: self.registry.active_count(),
            snapshot_len: self.reconciler.snapshot().map(<[Wallet]>::len),
            pending_updates: self.reconciler.pending().len(),
            refreshes_in_flight: self.refreshes_in_flight,
            reachability: self.reachability.current(),
        }
    }
}

/// Cloneable handle to a running [`SyncService`].
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
    notifier: FanoutNotifier,
    tokens: TokenAllocator,
}

impl SyncHandle {
    /// Register a new consumer.
    ///
    /// The socket is not opened until the consumer calls
    /// [`Subscription::request_updates`].
    pub fn subscribe(&self) -> Subscription {
        let token = self.tokens.next_token();
        let events = self.notifier.subscribe();
        if self.commands.send(SyncCommand::Subscribe(token)).is_err() {
            warn!(%token, "Sync service stopped, subscription is inert");
        }
        Subscription {
            token,
            events,
            commands: self.commands.clone(),
        }
    }

    /// Supply the current wallet list.
    pub fn wallets_changed(&self, wallets: Vec<Wallet>) -> SyncResult<()> {
        self.send(SyncCommand::WalletsChanged(wallets))
    }

    /// Report a network reachability change.
    pub fn reachability_changed(&self, status: Reachability) -> SyncResult<()> {
        self.send(SyncCommand::Reachability(status))
    }

    /// Stop receiving pushes for `account` on the open socket.
    pub fn stop_listening(&self, account: AccountId) -> SyncResult<()> {
        self.send(SyncCommand::StopListening(account))
    }

    /// Current service state, after every command sent before this call.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::Status(tx))?;
        rx.await.map_err(|_| SyncError::ServiceStopped)
    }

    /// Stop the service. The socket is closed on the way out.
    pub fn shutdown(&self) -> SyncResult<()> {
        self.send(SyncCommand::Shutdown)
    }

    fn send(&self, cmd: SyncCommand) -> SyncResult<()> {
        self.commands
            .send(cmd)
            .map_err(|_| SyncError::ServiceStopped)
    }
}

/// A consumer's registration.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    token: ConsumerToken,
    events: broadcast::Receiver<WalletsChanged>,
    commands: mpsc::UnboundedSender<SyncCommand>,
}

impl Subscription {
    pub fn token(&self) -> ConsumerToken {
        self.token
    }

    /// Ask for live updates. Opens the socket on the first request of this
    /// consumer; later calls do nothing.
    pub fn request_updates(&self) -> SyncResult<()> {
        self.commands
            .send(SyncCommand::RequestUpdates(self.token))
            .map_err(|_| SyncError::ServiceStopped)
    }

    /// Wait for the next wallet update.
    pub async fn recv(&mut self) -> Result<WalletsChanged, broadcast::error::RecvError> {
        self.events.recv().await
    }

    /// Next wallet update if one is queued.
    pub fn try_recv(&mut self) -> Result<WalletsChanged, broadcast::error::TryRecvError> {
        self.events.try_recv()
    }

    /// Unsubscribe explicitly.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(SyncCommand::Unsubscribe(self.token));
    }
}
