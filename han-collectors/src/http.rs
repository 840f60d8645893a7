//! Shared HTTP client for source API requests.

use crate::config::HttpConfig;
use crate::error::CollectError;
use std::time::Duration;

/// User-Agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("hanserver/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] configured for source API requests.
///
/// The client has:
/// - Timeout from config
/// - The configured User-Agent, or [`DEFAULT_USER_AGENT`]
/// - gzip decompression
///
/// # Errors
///
/// Returns [`CollectError::Http`] if the client cannot be constructed.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, CollectError> {
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| CollectError::Http(format!("failed to build HTTP client: {e}")))
}

/// Send a GET request and decode a JSON body, mapping failures onto
/// [`CollectError`]. 401/403 responses are reported as auth errors.
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    source: &str,
) -> Result<T, CollectError> {
    let response = request
        .send()
        .await
        .map_err(|e| CollectError::Http(format!("{source} request failed: {}", e.without_url())))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(CollectError::Auth(format!("{source} rejected credentials ({status})")));
    }
    if !status.is_success() {
        return Err(CollectError::Http(format!("{source} HTTP error: {status}")));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| CollectError::Parse(format!("{source} response decode failed: {}", e.without_url())))
}
