//! Source configuration with sensible defaults.
//!
//! Each source has its own record. Fields missing from a configuration file
//! take the source's defaults, and every source is disabled unless the file
//! turns it on.

use serde::{Deserialize, Serialize};

use crate::error::CollectError;
use crate::types::SourceConfig;

/// Configuration for every known source plus the shared HTTP client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub flickr: FlickrConfig,
    pub google_places: GooglePlacesConfig,
    pub http: HttpConfig,
}

impl SourcesConfig {
    /// Validates every enabled source.
    pub fn validate(&self) -> Result<(), CollectError> {
        self.http.validate()?;
        if self.flickr.enabled {
            self.flickr.validate()?;
        }
        if self.google_places.enabled {
            self.google_places.validate()?;
        }
        Ok(())
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Custom User-Agent string. Defaults to `hanserver/<version>`.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<(), CollectError> {
        if self.timeout_seconds == 0 {
            return Err(CollectError::Config(
                "http.timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Flickr photo search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlickrConfig {
    pub enabled: bool,
    pub update_frequency_secs: u64,
    pub query_limit: u32,
    pub query_window_secs: u64,
    pub api_key: String,
    /// API root, overridable for testing.
    pub base_url: String,
}

impl Default for FlickrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_frequency_secs: 60 * 60,
            query_limit: 3000,
            query_window_secs: 60 * 60,
            api_key: String::new(),
            base_url: "https://api.flickr.com".into(),
        }
    }
}

impl FlickrConfig {
    pub const NAME: &'static str = "flickr";

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig::new(Self::NAME)
            .enabled(self.enabled)
            .with_budget(self.query_limit, self.query_window_secs)
            .with_update_frequency(self.update_frequency_secs)
    }

    pub fn validate(&self) -> Result<(), CollectError> {
        if self.api_key.is_empty() {
            return Err(CollectError::Config("flickr.api_key must be set".into()));
        }
        validate_common(Self::NAME, self.update_frequency_secs, &self.base_url)
    }
}

/// Google Places nearby search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GooglePlacesConfig {
    pub enabled: bool,
    pub update_frequency_secs: u64,
    pub query_limit: u32,
    pub query_window_secs: u64,
    pub api_key: String,
    /// Photo endpoint stored in image URLs. Point this at a proxy to keep
    /// the API key out of responses.
    pub photo_url: String,
    /// API root, overridable for testing.
    pub base_url: String,
}

impl Default for GooglePlacesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_frequency_secs: 12 * 60 * 60,
            query_limit: 900,
            query_window_secs: 24 * 60 * 60,
            api_key: String::new(),
            photo_url: String::new(),
            base_url: "https://maps.googleapis.com".into(),
        }
    }
}

impl GooglePlacesConfig {
    pub const NAME: &'static str = "google-places";

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig::new(Self::NAME)
            .enabled(self.enabled)
            .with_budget(self.query_limit, self.query_window_secs)
            .with_update_frequency(self.update_frequency_secs)
    }

    pub fn validate(&self) -> Result<(), CollectError> {
        if self.api_key.is_empty() {
            return Err(CollectError::Config(
                "google_places.api_key must be set".into(),
            ));
        }
        if self.photo_url.is_empty() {
            return Err(CollectError::Config(
                "google_places.photo_url must be set".into(),
            ));
        }
        validate_common(Self::NAME, self.update_frequency_secs, &self.base_url)
    }
}

fn validate_common(name: &str, update_frequency_secs: u64, base_url: &str) -> Result<(), CollectError> {
    if update_frequency_secs == 0 {
        return Err(CollectError::Config(format!(
            "{name}: update_frequency_secs must be greater than 0"
        )));
    }
    url::Url::parse(base_url)
        .map_err(|e| CollectError::Config(format!("{name}: invalid base_url: {e}")))?;
    Ok(())
}
