//! # han-collectors
//!
//! Geotagged image collection for hanserver.
//!
//! Each public photo API is wrapped in a [`SourceCollector`] that turns a
//! coordinate into a list of [`Image`] records. Every network call a
//! collector makes is gated by that source's [`RateLimiter`], so a source
//! never exceeds its configured query budget.
//!
//! ## Design
//!
//! - Collectors query the requested point first, then widen to four points
//!   5 km away until enough images are found
//! - Budgets are fixed windows: a window opens on the first call after the
//!   previous one expired
//! - A source that rejects its credentials is flagged and denied from then on
//!
//! ## Security
//!
//! - API keys are sent as query parameters but never logged
//! - Transport errors are stripped of request URLs before they are returned

pub mod collector;
pub mod config;
pub mod error;
pub mod geo;
pub mod http;
pub mod rate_limit;
pub mod sources;
pub mod types;

pub use collector::SourceCollector;
pub use config::{FlickrConfig, GooglePlacesConfig, HttpConfig, SourcesConfig};
pub use error::{CollectError, Result};
pub use geo::Coordinate;
pub use rate_limit::RateLimiter;
pub use sources::{FlickrCollector, GooglePlacesCollector};
pub use types::{Image, SourceConfig};

use std::sync::Arc;

/// Build a collector for every enabled source in `config`.
///
/// # Errors
///
/// Returns [`CollectError::Config`] if an enabled source is misconfigured,
/// or [`CollectError::Http`] if an HTTP client cannot be built.
pub fn build_collectors(config: &SourcesConfig) -> Result<Vec<Arc<dyn SourceCollector>>> {
    config.validate()?;

    let mut collectors: Vec<Arc<dyn SourceCollector>> = Vec::new();
    if config.flickr.enabled {
        collectors.push(Arc::new(FlickrCollector::new(config.flickr.clone(), &config.http)?));
    }
    if config.google_places.enabled {
        collectors.push(Arc::new(GooglePlacesCollector::new(
            config.google_places.clone(),
            &config.http,
        )?));
    }
    tracing::debug!(count = collectors.len(), "source collectors built");
    Ok(collectors)
}
