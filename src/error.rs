//! Error types for hanserver.

use han_collectors::CollectError;

/// Top-level error type for the feed server.
#[derive(Debug, thiserror::Error)]
pub enum HanError {
    /// Malformed request input, such as an out-of-range coordinate.
    #[error("validation error: {0}")]
    Validation(String),

    /// A source failed to answer a query.
    #[error("source error: {0}")]
    SourceQuery(#[from] CollectError),

    /// A source's query budget is exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Image store read or write failure.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for HanError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HanError>;
