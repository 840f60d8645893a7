//! Google Places nearby search source.
//!
//! Every place photo becomes one image. Places carry no capture time, so
//! images are stamped with the time they were collected.

use async_trait::async_trait;
use serde::Deserialize;

use crate::collector::SourceCollector;
use crate::config::{GooglePlacesConfig, HttpConfig};
use crate::error::CollectError;
use crate::geo::{Coordinate, QUERY_RANGE_METERS};
use crate::http;
use crate::rate_limit::RateLimiter;
use crate::types::{Image, SourceConfig};

use super::widen_search;

/// Google Places API client.
pub struct GooglePlacesCollector {
    settings: GooglePlacesConfig,
    config: SourceConfig,
    client: reqwest::Client,
}

impl GooglePlacesCollector {
    /// # Errors
    ///
    /// Returns [`CollectError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: GooglePlacesConfig, http_config: &HttpConfig) -> Result<Self, CollectError> {
        let client = http::build_client(http_config)?;
        Ok(Self {
            config: settings.source_config(),
            settings,
            client,
        })
    }

    async fn query(&self, coord: Coordinate) -> Result<Vec<Image>, CollectError> {
        let url = format!(
            "{}/maps/api/place/nearbysearch/json",
            self.settings.base_url.trim_end_matches('/')
        );
        let location = format!("{},{}", coord.lat, coord.lng);
        let radius = format!("{QUERY_RANGE_METERS:.0}");
        let request = self.client.get(url).query(&[
            ("location", location.as_str()),
            ("radius", radius.as_str()),
            ("key", self.settings.api_key.as_str()),
        ]);

        let response: NearbyResponse = http::get_json(request, GooglePlacesConfig::NAME).await?;
        parse_nearby_response(response, &self.settings.photo_url, chrono::Utc::now().timestamp())
    }
}

#[async_trait]
impl SourceCollector for GooglePlacesCollector {
    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn get_images(&self, coord: Coordinate, limiter: &RateLimiter) -> Result<Vec<Image>, CollectError> {
        tracing::trace!(%coord, "Google Places search");
        widen_search(coord, &self.config, limiter, |point| self.query(point)).await
    }
}

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    name: String,
    #[serde(default)]
    place_id: String,
    geometry: Geometry,
    #[serde(default)]
    photos: Vec<PlacePhoto>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct PlacePhoto {
    photo_reference: String,
    #[serde(default)]
    html_attributions: Vec<String>,
}

fn parse_nearby_response(
    response: NearbyResponse,
    photo_url: &str,
    collected_at: i64,
) -> Result<Vec<Image>, CollectError> {
    let detail = || {
        response
            .error_message
            .clone()
            .unwrap_or_else(|| response.status.clone())
    };
    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(Vec::new()),
        "REQUEST_DENIED" => return Err(CollectError::Auth(format!("google-places: {}", detail()))),
        "OVER_QUERY_LIMIT" => {
            return Err(CollectError::QuotaExceeded(format!("google-places: {}", detail())))
        }
        _ => return Err(CollectError::Http(format!("google-places: {}", detail()))),
    }

    let mut images = Vec::new();
    for place in response.results {
        let location = Coordinate::new(place.geometry.location.lat, place.geometry.location.lng);
        let link = if place.place_id.is_empty() {
            String::new()
        } else {
            format!("https://www.google.com/maps/place/?q=place_id:{}", place.place_id)
        };
        for photo in place.photos {
            let url = format!("{photo_url}?photoreference={}", photo.photo_reference);
            let username = photo
                .html_attributions
                .first()
                .map(|a| strip_tags(a))
                .unwrap_or_default();
            images.push(
                Image::new(
                    photo.photo_reference,
                    place.name.clone(),
                    collected_at,
                    location,
                    GooglePlacesConfig::NAME,
                )
                .with_urls(url.clone(), url)
                .with_attribution(link.clone(), username),
            );
        }
    }

    tracing::debug!(count = images.len(), "Google Places photos parsed");
    Ok(images)
}

/// Reduce an attribution anchor like `<a href="...">Name</a>` to its text.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTO_URL: &str = "https://proxy.example/photo";

    const MOCK_RESPONSE: &str = r#"{
        "html_attributions": [],
        "results": [
            {
                "geometry": {"location": {"lat": -35.2809, "lng": 149.1300}},
                "name": "Parliament House",
                "place_id": "ChIJ1",
                "photos": [
                    {"height": 100, "width": 100, "photo_reference": "REF_A",
                     "html_attributions": ["<a href=\"https://maps.google.com/maps/contrib/1\">Alice</a>"]},
                    {"height": 100, "width": 100, "photo_reference": "REF_B", "html_attributions": []}
                ]
            },
            {
                "geometry": {"location": {"lat": -35.29, "lng": 149.12}},
                "name": "No photos here",
                "place_id": "ChIJ2"
            }
        ],
        "status": "OK"
    }"#;

    fn parse(json: &str) -> Result<Vec<Image>, CollectError> {
        let response: NearbyResponse = serde_json::from_str(json).expect("valid json");
        parse_nearby_response(response, PHOTO_URL, 1_700_000_000)
    }

    #[test]
    fn parse_mock_response_one_image_per_photo() {
        let images = parse(MOCK_RESPONSE).expect("should parse");
        assert_eq!(images.len(), 2);

        assert_eq!(images[0].id, "REF_A");
        assert_eq!(images[0].caption, "Parliament House");
        assert_eq!(images[0].created_time, 1_700_000_000);
        assert_eq!(images[0].image_url, "https://proxy.example/photo?photoreference=REF_A");
        assert_eq!(images[0].thumbnail_url, images[0].image_url);
        assert_eq!(images[0].username, "Alice");
        assert_eq!(images[0].link, "https://www.google.com/maps/place/?q=place_id:ChIJ1");
        assert_eq!(images[0].source, "google-places");

        assert_eq!(images[1].id, "REF_B");
        assert_eq!(images[1].username, "");
        assert_eq!(images[1].location, images[0].location);
    }

    #[test]
    fn zero_results_is_empty() {
        let images = parse(r#"{"results": [], "status": "ZERO_RESULTS"}"#).expect("should parse");
        assert!(images.is_empty());
    }

    #[test]
    fn request_denied_is_auth_error() {
        let err = parse(r#"{"results": [], "status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#)
            .unwrap_err();
        assert!(matches!(err, CollectError::Auth(_)));
        assert!(err.to_string().contains("API key is invalid"));
    }

    #[test]
    fn over_query_limit_is_quota_error() {
        let err = parse(r#"{"results": [], "status": "OVER_QUERY_LIMIT"}"#).unwrap_err();
        assert!(err.is_quota());
    }

    #[test]
    fn unknown_status_is_http_error() {
        let err = parse(r#"{"results": [], "status": "UNKNOWN_ERROR"}"#).unwrap_err();
        assert!(matches!(err, CollectError::Http(_)));
        assert!(err.to_string().contains("UNKNOWN_ERROR"));
    }

    #[test]
    fn strip_tags_extracts_text() {
        assert_eq!(strip_tags("<a href=\"x\">Bob Smith</a>"), "Bob Smith");
        assert_eq!(strip_tags("plain"), "plain");
        assert_eq!(strip_tags(""), "");
    }

    #[test]
    fn collector_uses_places_budget() {
        let collector = GooglePlacesCollector::new(GooglePlacesConfig::default(), &HttpConfig::default())
            .expect("client");
        assert_eq!(collector.name(), "google-places");
        assert!(!collector.config().enabled);
        assert_eq!(collector.config().query_limit, 900);
    }
}
