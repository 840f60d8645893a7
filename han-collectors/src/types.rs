//! Core types: the image record stored and served by hanserver, and the
//! per-source configuration record.

use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};

/// A geotagged image collected from a source.
///
/// `region` is unset when a collector produces the image; the harvest
/// orchestrator assigns it on persistence because collectors have no idea
/// which watched region a query belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Source-assigned identifier, unique across the store.
    pub id: String,
    pub caption: String,
    /// Creation or upload time in epoch seconds.
    #[serde(rename = "createdTime")]
    pub created_time: i64,
    #[serde(rename = "url")]
    pub image_url: String,
    pub thumbnail_url: String,
    /// Page on the source site, for attribution.
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub username: String,
    /// Where the photo was taken.
    pub location: Coordinate,
    #[serde(default)]
    pub region: Option<Coordinate>,
    /// Name of the source that produced this image.
    #[serde(default)]
    pub source: String,
    /// Meters from the coordinate of the query that returned this image.
    /// Only meaningful for that query.
    #[serde(default)]
    pub distance: f64,
    #[serde(skip)]
    pub deleted: bool,
    #[serde(skip)]
    pub deleted_reason: Option<String>,
}

impl Image {
    /// Create a record ready for collection. Region, distance and
    /// moderation fields take their defaults.
    pub fn new(
        id: impl Into<String>,
        caption: impl Into<String>,
        created_time: i64,
        location: Coordinate,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            caption: caption.into(),
            created_time,
            image_url: String::new(),
            thumbnail_url: String::new(),
            link: String::new(),
            username: String::new(),
            location,
            region: None,
            source: source.into(),
            distance: 0.0,
            deleted: false,
            deleted_reason: None,
        }
    }

    pub fn with_urls(mut self, image_url: impl Into<String>, thumbnail_url: impl Into<String>) -> Self {
        self.image_url = image_url.into();
        self.thumbnail_url = thumbnail_url.into();
        self
    }

    pub fn with_attribution(mut self, link: impl Into<String>, username: impl Into<String>) -> Self {
        self.link = link.into();
        self.username = username.into();
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }
}

/// Scheduling and budget settings shared by every source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name, used in logs and stored on each image.
    pub name: String,
    /// Disabled sources are skipped by harvests and sweeps.
    pub enabled: bool,
    /// Seconds between sweep harvests of every region.
    pub update_frequency_secs: u64,
    /// Maximum network calls allowed per query window.
    pub query_limit: u32,
    /// Length of the query budget window in seconds.
    pub query_window_secs: u64,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            update_frequency_secs: 60 * 60,
            query_limit: 100,
            query_window_secs: 60 * 60,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_budget(mut self, query_limit: u32, query_window_secs: u64) -> Self {
        self.query_limit = query_limit;
        self.query_window_secs = query_window_secs;
        self
    }

    pub fn with_update_frequency(mut self, secs: u64) -> Self {
        self.update_frequency_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Image {
        Image::new("abc", "sunset", 1_500_000_000, Coordinate::new(1.0, 2.0), "flickr")
            .with_urls("https://img/b.jpg", "https://img/t.jpg")
            .with_attribution("https://flickr.com/photos/o/abc", "owner")
    }

    #[test]
    fn json_uses_feed_field_names() {
        let json = serde_json::to_value(sample().with_distance(12.5)).expect("serialize");
        assert_eq!(json["createdTime"], 1_500_000_000);
        assert_eq!(json["url"], "https://img/b.jpg");
        assert_eq!(json["thumbnail_url"], "https://img/t.jpg");
        assert_eq!(json["location"]["lat"], 1.0);
        assert_eq!(json["distance"], 12.5);
        assert!(json.get("deleted").is_none());
        assert!(json.get("deleted_reason").is_none());
    }

    #[test]
    fn deserialize_tolerates_missing_optional_fields() {
        let json = r#"{
            "id": "1", "caption": "c", "createdTime": 5, "url": "u",
            "thumbnail_url": "t", "location": {"lat": 0.0, "lng": 0.0}
        }"#;
        let image: Image = serde_json::from_str(json).expect("deserialize");
        assert_eq!(image.id, "1");
        assert!(image.region.is_none());
        assert_eq!(image.distance, 0.0);
        assert!(!image.deleted);
    }

    #[test]
    fn new_image_has_no_region() {
        let image = sample();
        assert!(image.region.is_none());
        assert_eq!(image.source, "flickr");
        assert_eq!(image.username, "owner");
    }

    #[test]
    fn source_config_defaults_disabled() {
        let config = SourceConfig::new("mock");
        assert!(!config.enabled);
        assert_eq!(config.name, "mock");
    }

    #[test]
    fn source_config_builders() {
        let config = SourceConfig::new("mock")
            .enabled(true)
            .with_budget(5, 60)
            .with_update_frequency(30);
        assert!(config.enabled);
        assert_eq!(config.query_limit, 5);
        assert_eq!(config.query_window_secs, 60);
        assert_eq!(config.update_frequency_secs, 30);
    }
}
