//! Lumen wallet sync daemon.
//!
//! Wires the push socket, portal client and Horizon balance client into a
//! running sync service:
//! - configuration from TOML
//! - reachability probing of the portal
//! - a logging consumer for wallet updates

pub mod app;
pub mod config;
pub mod error;
pub mod probe;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use probe::ReachabilityProbe;
