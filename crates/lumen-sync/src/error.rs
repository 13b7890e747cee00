//! Sync service error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync service stopped")]
    ServiceStopped,

    #[error("Wallet detail fetch failed: {0}")]
    DetailFetch(String),

    #[error("Socket error: {0}")]
    Ws(#[from] lumen_ws::WsError),
}

pub type SyncResult<T> = Result<T, SyncError>;
