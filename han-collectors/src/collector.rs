//! Trait definition for pluggable image sources.
//!
//! Each source (Flickr, Google Places, ...) implements [`SourceCollector`]
//! to provide a uniform interface for collecting images near a coordinate.

use async_trait::async_trait;

use crate::error::CollectError;
use crate::geo::Coordinate;
use crate::rate_limit::RateLimiter;
use crate::types::{Image, SourceConfig};

/// A pluggable image source.
///
/// Implementors query a specific API and convert its response into
/// [`Image`] records. Each source handles its own:
///
/// - URL construction and authentication
/// - Widening the search around the requested coordinate
/// - Mapping API failures onto [`CollectError`]
///
/// The limiter passed to [`get_images`](Self::get_images) belongs to this
/// source. Implementations must call it before every network request,
/// sub-requests included.
///
/// All implementations must be `Send + Sync` for concurrent harvests.
#[async_trait]
pub trait SourceCollector: Send + Sync {
    /// The source's scheduling and budget record.
    fn config(&self) -> &SourceConfig;

    /// Collect images near `coord`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::QuotaExceeded`] if the limiter denied the
    /// first request, or another [`CollectError`] if that request failed.
    /// Failures of later sub-requests are not errors; the images gathered
    /// so far are returned.
    async fn get_images(&self, coord: Coordinate, limiter: &RateLimiter) -> Result<Vec<Image>, CollectError>;

    /// Shorthand for `self.config().name`.
    fn name(&self) -> &str {
        &self.config().name
    }
}
