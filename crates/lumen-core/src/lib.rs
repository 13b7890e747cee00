//! Core domain types for Lumen wallet synchronization.
//!
//! This crate provides the types shared by the socket layer and the sync service:
//! - `AccountId`: Stellar account public key
//! - `Wallet`, `Balance`, `AssetCode`: wallet records with their balances
//! - `SessionKey`: per-connection correlation token

pub mod account;
pub mod error;
pub mod session;
pub mod wallet;

pub use account::AccountId;
pub use error::{CoreError, Result};
pub use session::SessionKey;
pub use wallet::{AssetCode, Balance, Wallet};
