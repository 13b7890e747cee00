//! Daemon wiring and main loop.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::probe::ReachabilityProbe;
use lumen_horizon::HorizonClient;
use lumen_sync::{Subscription, SyncHandle, SyncService, WalletsChanged};
use lumen_telemetry::Metrics;
use lumen_ws::{HttpPortalClient, TungsteniteTransport};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Running daemon.
pub struct Application {
    config: AppConfig,
    handle: SyncHandle,
    service: JoinHandle<()>,
    probe: ReachabilityProbe,
}

impl Application {
    /// Build the clients and start the sync service. Must be called from
    /// within a Tokio runtime.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let portal = HttpPortalClient::new(
            config.portal.base_url.clone(),
            config.portal.auth_token.clone(),
            config.portal_timeout(),
        )?;
        let horizon = HorizonClient::with_timeout(config.horizon.url.clone(), config.horizon_timeout())?;
        let probe = ReachabilityProbe::new(portal.base_url(), config.portal_timeout())?;

        let (handle, service) = SyncService::spawn(
            config.sync_config(),
            Arc::new(TungsteniteTransport::new()),
            Arc::new(portal),
            Arc::new(horizon),
        );

        Ok(Self {
            config,
            handle,
            service,
            probe,
        })
    }

    /// Run until Ctrl-C.
    pub async fn run(mut self) -> AppResult<()> {
        let mut subscription = self.handle.subscribe();
        subscription.request_updates()?;

        let wallets = self.config.wallets();
        info!(wallets = wallets.len(), "Tracking wallets");
        self.handle.wallets_changed(wallets)?;

        let mut probe_interval = tokio::time::interval(self.config.probe_interval());

        loop {
            tokio::select! {
                update = subscription.recv() => match update {
                    Ok(event) => log_update(&subscription, &event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Wallet updates dropped, consumer too slow");
                    }
                    Err(RecvError::Closed) => {
                        warn!("Sync service went away");
                        break;
                    }
                },

                _ = probe_interval.tick() => {
                    if let Some(status) = self.probe.poll().await {
                        info!(?status, "Reachability changed");
                        self.handle.reachability_changed(status)?;
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        subscription.unsubscribe();
        if let Ok(status) = self.handle.status().await {
            info!(?status, "Final sync status");
        }
        if self.handle.shutdown().is_ok() {
            if let Err(e) = self.service.await {
                error!(error = %e, "Sync service task failed");
            }
        }

        match Metrics::render() {
            Ok(metrics) => info!("Final metrics:\n{metrics}"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        Ok(())
    }
}

fn log_update(subscription: &Subscription, event: &WalletsChanged) {
    for wallet in &event.wallets {
        info!(
            consumer = %subscription.token(),
            wallet = %wallet.name,
            account = %wallet.public_key.short(),
            native = ?wallet.native_balance(),
            assets = wallet.balances.len(),
            "Wallet updated"
        );
    }
}
