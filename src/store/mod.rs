//! Image and region persistence.
//!
//! [`Store`] is the contract the feed and harvest code are written against.
//! Two backends are provided: [`MemoryStore`] for tests and throwaway
//! deployments, and [`SqliteStore`] for everything else.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use han_collectors::{Coordinate, Image};

use crate::error::Result;

/// Geo-indexed image and region storage.
///
/// Implementations must tolerate concurrent writers: straggling harvest
/// tasks from overlapping harvests all persist through the same store.
pub trait Store: Send + Sync {
    /// Every registered region center, in registration order.
    fn regions(&self) -> Result<Vec<Coordinate>>;

    /// Register a region center. Callers check coverage first.
    fn add_region(&self, center: Coordinate) -> Result<()>;

    /// Insert or replace a single image, keyed by id.
    fn add_image(&self, image: Image) -> Result<()>;

    /// Upsert `images`, tagging each with `region`.
    fn add_bulk_images(&self, images: &[Image], region: Coordinate) -> Result<()>;

    /// Images in `[start, end)` of the ascending-distance ordering from
    /// `coord`, with `distance` set relative to `coord`.
    ///
    /// Soft-deleted images are excluded. Equal distances keep insertion
    /// order so repeated queries page consistently.
    fn query_near(&self, coord: Coordinate, start: usize, end: usize) -> Result<Vec<Image>>;

    /// Every stored image, soft-deleted ones included.
    fn all_images(&self) -> Result<Vec<Image>>;

    /// Hide an image from feeds. Returns `false` if no image has `id`.
    fn soft_delete(&self, id: &str, reason: &str) -> Result<bool>;

    /// Number of stored images, soft-deleted ones included.
    fn size(&self) -> Result<usize>;

    /// Permanently remove the `n` images with the oldest `created_time`.
    /// Returns how many were removed.
    fn delete_oldest(&self, n: usize) -> Result<usize>;
}

/// Order `candidates` by distance from `coord` and copy out `[start, end)`.
///
/// `candidates` must be in insertion order; the sort is stable so that
/// order breaks distance ties. Only the window is cloned.
pub(crate) fn rank_by_distance<'a>(
    candidates: impl IntoIterator<Item = &'a Image>,
    coord: Coordinate,
    start: usize,
    end: usize,
) -> Vec<Image> {
    let mut ranked: Vec<(f64, &Image)> = candidates
        .into_iter()
        .map(|image| (coord.distance_to(&image.location), image))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let end = end.min(ranked.len());
    if start >= end {
        return Vec::new();
    }
    ranked[start..end]
        .iter()
        .map(|&(distance, image)| image.clone().with_distance(distance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str, lat: f64) -> Image {
        Image::new(id, "", 0, Coordinate::new(lat, 0.0), "test")
    }

    #[test]
    fn rank_orders_by_distance_and_sets_it() {
        let ranked = rank_by_distance(
            &[image("far", 0.2), image("near", 0.0), image("mid", 0.1)],
            Coordinate::new(0.0, 0.0),
            0,
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert_eq!(ranked[0].distance, 0.0);
        assert!(ranked[2].distance > ranked[1].distance);
    }

    #[test]
    fn rank_keeps_insertion_order_on_ties() {
        let ranked = rank_by_distance(
            &[image("a", 0.1), image("b", 0.1), image("c", 0.1)],
            Coordinate::new(0.0, 0.0),
            0,
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn rank_clamps_window() {
        let candidates = vec![image("a", 0.0), image("b", 0.1), image("c", 0.2)];
        let origin = Coordinate::new(0.0, 0.0);
        assert_eq!(rank_by_distance(&candidates, origin, 1, 100).len(), 2);
        assert!(rank_by_distance(&candidates, origin, 3, 10).is_empty());
        assert!(rank_by_distance(&candidates, origin, 2, 1).is_empty());
        assert_eq!(rank_by_distance(&candidates, origin, 0, usize::MAX).len(), 3);
    }
}
