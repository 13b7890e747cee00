//! Horizon client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HorizonError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status} for account {account}")]
    HttpStatus { status: u16, account: String },

    #[error("Malformed balance entry: {0}")]
    Balance(#[from] lumen_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HorizonResult<T> = Result<T, HorizonError>;

impl From<HorizonError> for lumen_sync::SyncError {
    fn from(e: HorizonError) -> Self {
        lumen_sync::SyncError::DetailFetch(e.to_string())
    }
}
