//! Error handling module.
use thiserror::Error;

/// PeerLens error enum.
#[derive(Error, Debug)]
pub enum PeerLensError {
    #[error("NetworkError: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The route table upstream answered with a non-success status.
    #[error("UpstreamUnavailable: status {status}: {body}")]
    UpstreamUnavailable { status: u16, body: String },

    #[error("InvalidInput: {0}")]
    InvalidInput(String),

    #[error("JsonError: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("ConfigError: {0}")]
    ConfigError(String),

    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("DbError: {0}")]
    DbError(#[from] sqlx::Error),
}

impl PeerLensError {
    /// Whether the error was caused by the caller rather than by an upstream or the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PeerLensError::InvalidInput(_))
    }
}
