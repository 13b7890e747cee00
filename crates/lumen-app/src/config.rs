//! Application configuration.

use crate::error::{AppError, AppResult};
use lumen_core::{AccountId, Wallet};
use lumen_sync::SyncConfig;
use lumen_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Portal REST and socket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Base URL, e.g. "https://portal.example.org".
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header.
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Buffered wallet update events per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonConfig {
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

/// A wallet tracked by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: u64,
    pub name: String,
    pub public_key: String,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_event_buffer() -> usize {
    64
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub portal: PortalConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    pub horizon: HorizonConfig,
    #[serde(default)]
    pub wallets: Vec<WalletEntry>,
    #[serde(default)]
    pub reachability: ReachabilityConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.portal.base_url.trim().is_empty() {
            return Err(AppError::Config("portal.base_url is empty".to_string()));
        }
        if self.horizon.url.trim().is_empty() {
            return Err(AppError::Config("horizon.url is empty".to_string()));
        }
        if self.reachability.probe_interval_ms == 0 {
            return Err(AppError::Config(
                "reachability.probe_interval_ms must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.wallets {
            AccountId::parse(&entry.public_key).map_err(|e| {
                AppError::Config(format!("wallet {} ({}): {e}", entry.id, entry.name))
            })?;
            if !seen.insert(entry.public_key.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate wallet key {}",
                    entry.public_key
                )));
            }
        }
        Ok(())
    }

    pub fn wallets(&self) -> Vec<Wallet> {
        self.wallets
            .iter()
            .map(|w| Wallet::new(w.id, w.name.clone(), AccountId::from_raw(w.public_key.clone())))
            .collect()
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            connection: ConnectionConfig {
                base_url: self.portal.base_url.clone(),
                auth_token: self.portal.auth_token.clone(),
                connect_timeout_ms: self.socket.connect_timeout_ms,
            },
            event_buffer: self.socket.event_buffer,
        }
    }

    pub fn portal_timeout(&self) -> Duration {
        Duration::from_millis(self.portal.request_timeout_ms)
    }

    pub fn horizon_timeout(&self) -> Duration {
        Duration::from_millis(self.horizon.request_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.reachability.probe_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7";
    const KEY_B: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";

    fn minimal() -> String {
        r#"
            [portal]
            base_url = "https://portal.test"

            [horizon]
            url = "https://horizon-testnet.stellar.org"
        "#
        .to_string()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_toml(&minimal()).unwrap();

        assert_eq!(config.portal.request_timeout_ms, 10_000);
        assert_eq!(config.socket.connect_timeout_ms, 10_000);
        assert_eq!(config.socket.event_buffer, 64);
        assert_eq!(config.reachability.probe_interval_ms, 5_000);
        assert!(config.wallets.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let content = format!(
            r#"
            [portal]
            base_url = "https://portal.test"
            auth_token = "Bearer abc"
            request_timeout_ms = 3000

            [socket]
            connect_timeout_ms = 2000
            event_buffer = 8

            [horizon]
            url = "https://horizon.stellar.org"

            [[wallets]]
            id = 1
            name = "Main"
            public_key = "{KEY_A}"

            [[wallets]]
            id = 2
            name = "Savings"
            public_key = "{KEY_B}"
            "#
        );
        let config = AppConfig::from_toml(&content).unwrap();
        config.validate().unwrap();

        let wallets = config.wallets();
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[1].name, "Savings");
        assert_eq!(wallets[1].public_key.as_str(), KEY_B);

        let sync = config.sync_config();
        assert_eq!(sync.connection.auth_token, "Bearer abc");
        assert_eq!(sync.connection.connect_timeout_ms, 2000);
        assert_eq!(sync.event_buffer, 8);
        assert_eq!(config.portal_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_missing_portal_rejected() {
        let result = AppConfig::from_toml("[horizon]\nurl = \"https://h\"\n");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_empty_url_rejected() {
        let mut config = AppConfig::from_toml(&minimal()).unwrap();
        config.horizon.url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_wallet_rejected() {
        let mut config = AppConfig::from_toml(&minimal()).unwrap();
        for id in [1, 2] {
            config.wallets.push(WalletEntry {
                id,
                name: format!("w{id}"),
                public_key: KEY_A.to_string(),
            });
        }
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_invalid_wallet_key_rejected() {
        let mut config = AppConfig::from_toml(&minimal()).unwrap();
        config.wallets.push(WalletEntry {
            id: 7,
            name: "broken".to_string(),
            public_key: "not-a-key".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_file_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let config = AppConfig::from_file(path).unwrap();
        assert!(config.validate().is_ok());
    }
}
