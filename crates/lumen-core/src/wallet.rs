//! Wallet records and balances.

use crate::account::AccountId;
use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Asset a balance is held in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssetCode {
    /// Lumens (XLM).
    Native,
    /// Issued asset, identified by code and issuer account.
    Credit { code: String, issuer: AccountId },
}

impl AssetCode {
    /// Build from Horizon's `asset_type` / `asset_code` / `asset_issuer` triple.
    pub fn from_horizon(
        asset_type: &str,
        code: Option<&str>,
        issuer: Option<&str>,
    ) -> Result<Self> {
        match asset_type {
            "native" => Ok(Self::Native),
            "credit_alphanum4" | "credit_alphanum12" => match (code, issuer) {
                (Some(code), Some(issuer)) => Ok(Self::Credit {
                    code: code.to_string(),
                    issuer: AccountId::from_raw(issuer),
                }),
                _ => Err(CoreError::InvalidAsset(format!(
                    "{asset_type} without code or issuer"
                ))),
            },
            other => Err(CoreError::InvalidAsset(other.to_string())),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "XLM"),
            Self::Credit { code, issuer } => write!(f, "{code}:{}", issuer.short()),
        }
    }
}

/// Amount of one asset held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: AssetCode,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl Balance {
    pub fn new(asset: AssetCode, amount: Decimal) -> Self {
        Self { asset, amount }
    }

    /// Parse a Horizon amount string (e.g. "100.0000000").
    pub fn parse(asset: AssetCode, amount: &str) -> Result<Self> {
        Ok(Self {
            asset,
            amount: Decimal::from_str(amount)?,
        })
    }
}

/// One of the user's wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Portal-side wallet id.
    pub id: u64,
    /// User-chosen wallet name.
    pub name: String,
    /// Stellar account backing the wallet.
    pub public_key: AccountId,
    /// Balances from the last detail refresh. Empty for unfunded accounts.
    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl Wallet {
    pub fn new(id: u64, name: impl Into<String>, public_key: AccountId) -> Self {
        Self {
            id,
            name: name.into(),
            public_key,
            balances: Vec::new(),
        }
    }

    /// Same wallet with refreshed balances.
    pub fn with_balances(mut self, balances: Vec<Balance>) -> Self {
        self.balances = balances;
        self
    }

    /// Native (XLM) balance, if the account is funded.
    pub fn native_balance(&self) -> Option<Decimal> {
        self.balances
            .iter()
            .find(|b| b.asset.is_native())
            .map(|b| b.amount)
    }

    /// An account with no balances has not been created on the ledger yet.
    pub fn is_funded(&self) -> bool {
        !self.balances.is_empty()
    }
}
