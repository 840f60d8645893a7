//! Image source implementations.
//!
//! Each module provides a struct implementing
//! [`crate::collector::SourceCollector`] against a specific public API.

pub mod flickr;
pub mod google_places;

pub use flickr::FlickrCollector;
pub use google_places::GooglePlacesCollector;

use std::future::Future;

use crate::error::CollectError;
use crate::geo::{surrounding_points, Coordinate, QUERY_RANGE_METERS};
use crate::rate_limit::RateLimiter;
use crate::types::{Image, SourceConfig};

/// Collected images at which a source stops widening its search.
pub const TARGET_IMAGE_COUNT: usize = 100;

/// Query `center`, then the ring of points around it until
/// [`TARGET_IMAGE_COUNT`] images are collected.
///
/// Every query is gated by `limiter`. A denied or failed first query is
/// returned as an error. Later queries stop on denial or auth rejection
/// and are skipped on any other failure.
pub(crate) async fn widen_search<F, Fut>(
    center: Coordinate,
    config: &SourceConfig,
    limiter: &RateLimiter,
    mut query: F,
) -> Result<Vec<Image>, CollectError>
where
    F: FnMut(Coordinate) -> Fut,
    Fut: Future<Output = Result<Vec<Image>, CollectError>>,
{
    limiter.try_acquire(config)?;
    let mut images = match query(center).await {
        Ok(images) => images,
        Err(err) => {
            if matches!(err, CollectError::Auth(_)) {
                limiter.flag_error();
            }
            return Err(err);
        }
    };

    for point in surrounding_points(center, QUERY_RANGE_METERS) {
        if images.len() >= TARGET_IMAGE_COUNT {
            break;
        }
        if !limiter.able_to_query(config) {
            tracing::debug!(source = %config.name, "budget exhausted while widening search");
            break;
        }
        match query(point).await {
            Ok(more) => images.extend(more),
            Err(CollectError::Auth(msg)) => {
                tracing::warn!(source = %config.name, error = %msg, "credentials rejected mid-search");
                limiter.flag_error();
                break;
            }
            Err(CollectError::QuotaExceeded(_)) => break,
            Err(err) => {
                tracing::debug!(source = %config.name, %point, error = %err, "sub-query failed");
            }
        }
    }

    Ok(images)
}

/// Parse a JSON value that some APIs send as either a number or a string.
pub(crate) fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer counterpart of [`lenient_f64`].
pub(crate) fn lenient_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
