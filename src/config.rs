//! Server configuration, loaded from TOML.
//!
//! Every section and field has a default, so a missing file section or
//! field falls back to it. The default file lives at
//! `<config dir>/hanserver/config.toml`.

use std::path::PathBuf;

use han_collectors::SourcesConfig;
use serde::{Deserialize, Serialize};

use crate::error::{HanError, Result};
use crate::feed::DEFAULT_SAMPLE_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HanConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub feed: FeedConfig,
    pub harvest: HarvestConfig,
    pub cleaner: CleanerConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
    pub sources: SourcesConfig,
}

/// HTTP API listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Use `0` to let the OS pick a port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
        }
    }
}

/// Which [`Store`](crate::store::Store) backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the SQLite backend.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hanserver")
            .join("images.db");
        Self {
            backend: StoreBackend::default(),
            path,
        }
    }
}

/// Feed ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Chunk size for blended-score sorting. Changing it invalidates the
    /// page boundaries clients already hold.
    pub sample_size: usize,
    /// Harvest new regions in the background instead of before answering
    /// the request that created them.
    pub background_harvest: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            background_harvest: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Run the periodic region sweeps alongside the API.
    pub collection_enabled: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            collection_enabled: true,
        }
    }
}

/// Store size bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub enabled: bool,
    /// Clean once the store holds this many images.
    pub image_limit: usize,
    /// How many of the oldest images to delete per clean.
    pub clearance_count: usize,
    pub interval_secs: u64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_limit: 500_000,
            clearance_count: 100_000,
            interval_secs: 60 * 60,
        }
    }
}

/// Where operator messages go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Slack bot token. Without one, reports are only logged.
    pub slack_token: Option<String>,
    pub slack_channel: String,
    /// Slack API root, overridable for testing.
    pub slack_base_url: Option<String>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            slack_token: None,
            slack_channel: "hanserver".to_owned(),
            slack_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to `<directory>/<file>` when set.
    pub directory: Option<PathBuf>,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file: "hanserver.log".to_owned(),
        }
    }
}

impl HanConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| HanError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| HanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/hanserver/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/hanserver-config"))
            .join("hanserver")
            .join("config.toml")
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.feed.sample_size == 0 {
            return Err(HanError::Config("feed.sample_size must be greater than 0".into()));
        }
        if self.cleaner.enabled {
            if self.cleaner.interval_secs == 0 {
                return Err(HanError::Config("cleaner.interval_secs must be greater than 0".into()));
            }
            if self.cleaner.clearance_count > self.cleaner.image_limit {
                return Err(HanError::Config(
                    "cleaner.clearance_count must not exceed cleaner.image_limit".into(),
                ));
            }
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.as_os_str().is_empty() {
            return Err(HanError::Config("store.path must be set for the sqlite backend".into()));
        }
        self.sources
            .validate()
            .map_err(|e| HanError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.feed.sample_size, 100);
        assert_eq!(config.cleaner.image_limit, 500_000);
        assert_eq!(config.cleaner.clearance_count, 100_000);
        assert_eq!(config.reporting.slack_channel, "hanserver");
        assert!(config.harvest.collection_enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml_str = r#"
            [server]
            port = 9000

            [store]
            backend = "memory"

            [sources.flickr]
            enabled = true
            api_key = "abc"
        "#;
        let config: HanConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.sources.flickr.enabled);
        assert_eq!(config.sources.flickr.query_limit, 3000);
        assert_eq!(config.feed.sample_size, DEFAULT_SAMPLE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = HanConfig::default();
        config.server.port = 0;
        config.feed.background_harvest = true;
        config.reporting.slack_token = Some("xoxb-1".into());
        config.save_to_file(&path).expect("save");

        let loaded = HanConfig::from_file(&path).expect("load");
        assert_eq!(loaded.server.port, 0);
        assert!(loaded.feed.background_harvest);
        assert_eq!(loaded.reporting.slack_token.as_deref(), Some("xoxb-1"));
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = HanConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(HanError::Io(_))));
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").expect("write");
        assert!(matches!(HanConfig::from_file(&path), Err(HanError::Config(_))));
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = HanConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("hanserver"));
    }

    #[test]
    fn zero_sample_size_rejected() {
        let mut config = HanConfig::default();
        config.feed.sample_size = 0;
        assert!(config.validate().unwrap_err().to_string().contains("sample_size"));
    }

    #[test]
    fn oversized_clearance_rejected() {
        let mut config = HanConfig::default();
        config.cleaner.image_limit = 10;
        config.cleaner.clearance_count = 20;
        assert!(config.validate().unwrap_err().to_string().contains("clearance_count"));
    }

    #[test]
    fn source_errors_surface_as_config_errors() {
        let mut config = HanConfig::default();
        config.sources.google_places.enabled = true;
        assert!(matches!(config.validate(), Err(HanError::Config(_))));
    }
}
