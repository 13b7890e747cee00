//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Socket error: {0}")]
    Ws(#[from] lumen_ws::WsError),

    #[error("Horizon error: {0}")]
    Horizon(#[from] lumen_horizon::HorizonError),

    #[error("Sync error: {0}")]
    Sync(#[from] lumen_sync::SyncError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] lumen_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
