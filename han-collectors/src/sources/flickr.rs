//! Flickr photo search source.
//!
//! Uses the `flickr.photos.search` REST method with geo, upload date,
//! license and owner extras so a single request yields complete records.

use async_trait::async_trait;
use serde::Deserialize;

use crate::collector::SourceCollector;
use crate::config::{FlickrConfig, HttpConfig};
use crate::error::CollectError;
use crate::geo::{Coordinate, QUERY_RANGE_METERS};
use crate::http;
use crate::rate_limit::RateLimiter;
use crate::types::{Image, SourceConfig};

use super::{lenient_f64, lenient_i64, widen_search};

/// Photos requested per search call.
const PER_PAGE: &str = "500";

/// Flickr error code for a missing or invalid API key.
const INVALID_API_KEY: i64 = 100;

/// Flickr REST API client.
pub struct FlickrCollector {
    settings: FlickrConfig,
    config: SourceConfig,
    client: reqwest::Client,
}

impl FlickrCollector {
    /// # Errors
    ///
    /// Returns [`CollectError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: FlickrConfig, http_config: &HttpConfig) -> Result<Self, CollectError> {
        let client = http::build_client(http_config)?;
        Ok(Self {
            config: settings.source_config(),
            settings,
            client,
        })
    }

    async fn query(&self, coord: Coordinate) -> Result<Vec<Image>, CollectError> {
        let url = format!("{}/services/rest/", self.settings.base_url.trim_end_matches('/'));
        let radius_km = (QUERY_RANGE_METERS / 1000.0).to_string();
        let lat = coord.lat.to_string();
        let lon = coord.lng.to_string();
        let request = self.client.get(url).query(&[
            ("method", "flickr.photos.search"),
            ("api_key", self.settings.api_key.as_str()),
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("radius", radius_km.as_str()),
            ("radius_units", "km"),
            ("per_page", PER_PAGE),
            ("extras", "geo,date_upload,license,owner_name"),
            ("format", "json"),
            ("nojsoncallback", "1"),
        ]);

        let response: SearchResponse = http::get_json(request, FlickrConfig::NAME).await?;
        parse_search_response(response)
    }
}

#[async_trait]
impl SourceCollector for FlickrCollector {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn get_images(&self, coord: Coordinate, limiter: &RateLimiter) -> Result<Vec<Image>, CollectError> {
        tracing::trace!(%coord, "Flickr search");
        widen_search(coord, &self.config, limiter, |point| self.query(point)).await
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    stat: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    photos: Option<PhotoPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photo: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
    owner: String,
    secret: String,
    server: String,
    farm: serde_json::Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    license: serde_json::Value,
    #[serde(default)]
    dateupload: serde_json::Value,
    #[serde(default)]
    ownername: String,
    #[serde(default)]
    latitude: serde_json::Value,
    #[serde(default)]
    longitude: serde_json::Value,
}

/// Convert a search response into images.
///
/// Photos that are all-rights-reserved (license 0) or missing a location
/// or upload date are skipped.
fn parse_search_response(response: SearchResponse) -> Result<Vec<Image>, CollectError> {
    if response.stat != "ok" {
        let message = response.message.unwrap_or_else(|| "unknown failure".into());
        return Err(match response.code {
            Some(INVALID_API_KEY) => CollectError::Auth(format!("flickr: {message}")),
            _ => CollectError::Http(format!("flickr: {message}")),
        });
    }

    let photos = response.photos.map(|p| p.photo).unwrap_or_default();
    let mut images = Vec::with_capacity(photos.len());
    for photo in photos {
        if lenient_i64(&photo.license).unwrap_or(0) == 0 {
            continue;
        }
        let (Some(lat), Some(lng)) = (lenient_f64(&photo.latitude), lenient_f64(&photo.longitude)) else {
            continue;
        };
        // Flickr reports 0,0 for photos without geo data.
        if lat == 0.0 && lng == 0.0 {
            continue;
        }
        let Some(uploaded) = lenient_i64(&photo.dateupload) else {
            continue;
        };

        let farm = match &photo.farm {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let base = format!(
            "https://farm{farm}.staticflickr.com/{}/{}_{}",
            photo.server, photo.id, photo.secret
        );
        let link = format!("https://www.flickr.com/photos/{}/{}", photo.owner, photo.id);

        images.push(
            Image::new(photo.id, photo.title, uploaded, Coordinate::new(lat, lng), FlickrConfig::NAME)
                .with_urls(format!("{base}_b.jpg"), format!("{base}_t.jpg"))
                .with_attribution(link, photo.ownername),
        );
    }

    tracing::debug!(count = images.len(), "Flickr photos parsed");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOCK_RESPONSE: &str = r#"{
        "photos": {
            "page": 1, "pages": 1, "perpage": 500, "total": 4,
            "photo": [
                {"id": "101", "owner": "12@N01", "secret": "aa", "server": "65535", "farm": 66,
                 "title": "Lake Burley Griffin", "license": "4", "dateupload": "1500000000",
                 "ownername": "alice", "latitude": -35.29, "longitude": "149.12"},
                {"id": "102", "owner": "13@N01", "secret": "bb", "server": "65535", "farm": 66,
                 "title": "All rights reserved", "license": "0", "dateupload": "1500000001",
                 "ownername": "bob", "latitude": -35.28, "longitude": 149.13},
                {"id": "103", "owner": "14@N01", "secret": "cc", "server": "1", "farm": "5",
                 "title": "No geo", "license": "2", "dateupload": "1500000002",
                 "ownername": "carol", "latitude": 0, "longitude": 0},
                {"id": "104", "owner": "15@N01", "secret": "dd", "server": "2", "farm": 1,
                 "title": "Parliament", "license": 9, "dateupload": 1500000003,
                 "ownername": "dave", "latitude": "-35.30", "longitude": "149.13"}
            ]
        },
        "stat": "ok"
    }"#;

    fn parse(json: &str) -> Result<Vec<Image>, CollectError> {
        let response: SearchResponse = serde_json::from_str(json).expect("valid json");
        parse_search_response(response)
    }

    #[test]
    fn parse_mock_response_filters_unusable_photos() {
        let images = parse(MOCK_RESPONSE).expect("should parse");
        assert_eq!(images.len(), 2);

        assert_eq!(images[0].id, "101");
        assert_eq!(images[0].caption, "Lake Burley Griffin");
        assert_eq!(images[0].created_time, 1_500_000_000);
        assert_eq!(
            images[0].image_url,
            "https://farm66.staticflickr.com/65535/101_aa_b.jpg"
        );
        assert_eq!(
            images[0].thumbnail_url,
            "https://farm66.staticflickr.com/65535/101_aa_t.jpg"
        );
        assert_eq!(images[0].link, "https://www.flickr.com/photos/12@N01/101");
        assert_eq!(images[0].username, "alice");
        assert_eq!(images[0].source, "flickr");
        assert!((images[0].location.lng - 149.12).abs() < 1e-9);

        assert_eq!(images[1].id, "104");
        assert_eq!(images[1].created_time, 1_500_000_003);
    }

    #[test]
    fn invalid_key_is_auth_error() {
        let err = parse(r#"{"stat": "fail", "code": 100, "message": "Invalid API Key"}"#).unwrap_err();
        assert!(matches!(err, CollectError::Auth(_)));
        assert!(err.to_string().contains("Invalid API Key"));
    }

    #[test]
    fn other_failure_is_http_error() {
        let err = parse(r#"{"stat": "fail", "code": 105, "message": "Service currently unavailable"}"#)
            .unwrap_err();
        assert!(matches!(err, CollectError::Http(_)));
    }

    #[test]
    fn empty_page_returns_empty() {
        let images = parse(r#"{"photos": {"photo": []}, "stat": "ok"}"#).expect("should parse");
        assert!(images.is_empty());
    }

    #[test]
    fn collector_uses_flickr_budget() {
        let collector = FlickrCollector::new(
            FlickrConfig {
                enabled: true,
                api_key: "k".into(),
                ..Default::default()
            },
            &HttpConfig::default(),
        )
        .expect("client");
        assert_eq!(collector.name(), "flickr");
        assert!(collector.config().enabled);
        assert_eq!(collector.config().query_limit, 3000);
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FlickrCollector>();
    }
}
