//! Error types for the han-collectors crate.
//!
//! All errors use stable string messages suitable for logging and for
//! forwarding to an error sink. No API keys appear in error messages.

/// Errors that can occur while collecting images from a source.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// An HTTP request to a source failed (transport or non-success status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The source rejected our credentials.
    #[error("auth error: {0}")]
    Auth(String),

    /// Failed to parse a source response.
    #[error("parse error: {0}")]
    Parse(String),

    /// The per-source query budget is exhausted for the current window.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Invalid source configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl CollectError {
    /// Returns `true` if this error is a query budget denial rather than
    /// a genuine source failure.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

/// Convenience type alias for han-collectors results.
pub type Result<T> = std::result::Result<T, CollectError>;
