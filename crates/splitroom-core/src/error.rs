//! Error types for splitroom-core

use thiserror::Error;

/// Result type alias using splitroom-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in splitroom-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure (connect, timeout, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The room service answered with a non-2xx status
    #[error("API error: {message} ({status})")]
    Api { status: u16, message: String },

    /// A cached record the operation expected is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A reconciliation pass could not bring the cache in line
    #[error("Reconciliation failed: {0}")]
    Reconcile(String),
}

impl Error {
    /// Whether the error came from talking to the room service.
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api { .. })
    }
}
