//! Horizon REST client.
//!
//! Refreshes wallet balances from `GET /accounts/{id}` and plugs into the
//! sync service as its [`lumen_sync::WalletDetailService`].

pub mod client;
pub mod error;

pub use client::HorizonClient;
pub use error::{HorizonError, HorizonResult};
