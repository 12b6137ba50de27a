//! Error types for the candle archive.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the candle archive.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing file, missing dataset path).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid, duplicate or missing columns in a save.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Conflicting or out-of-range query parameters.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Archive or table absent and creation was declined.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure opening, growing or writing the archive.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Failure reported by the remote candle source.
    #[error("Remote source error: {0}")]
    Remote(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Error::InvalidQuery(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a remote source error.
    pub fn remote(msg: impl Into<String>) -> Self {
        Error::Remote(msg.into())
    }
}
