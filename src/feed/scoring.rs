//! Blended distance and recency score.
//!
//! `score = distance_meters + age_seconds * RECENCY_BIAS`. Lower ranks
//! first, so a closer or more recent image wins.

use han_collectors::Image;

/// Meters of distance one second of age is worth.
pub const RECENCY_BIAS: f64 = 350.0;

/// Age of an image at `now`, in seconds. Future timestamps count as zero.
pub fn recency_seconds(now: i64, created_time: i64) -> f64 {
    now.saturating_sub(created_time).max(0) as f64
}

/// Blended score of `image` at `now` (epoch seconds).
///
/// `image.distance` must be relative to the current query.
pub fn score(image: &Image, now: i64) -> f64 {
    image.distance + recency_seconds(now, image.created_time) * RECENCY_BIAS
}

/// Stable sort by ascending score; equal scores keep their current order.
pub fn sort_by_score(images: &mut [Image], now: i64) {
    images.sort_by(|a, b| score(a, now).total_cmp(&score(b, now)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use han_collectors::Coordinate;

    fn image(id: &str, distance: f64, created: i64) -> Image {
        Image::new(id, "", created, Coordinate::new(0.0, 0.0), "test").with_distance(distance)
    }

    #[test]
    fn score_blends_distance_and_age() {
        let now = 1_000;
        assert_eq!(score(&image("a", 100.0, now), now), 100.0);
        assert_eq!(score(&image("a", 100.0, now - 2), now), 100.0 + 700.0);
    }

    #[test]
    fn future_timestamp_counts_as_zero_age() {
        assert_eq!(recency_seconds(100, 500), 0.0);
        assert_eq!(score(&image("a", 5.0, 500), 100), 5.0);
    }

    #[test]
    fn one_second_outweighs_small_distance() {
        let now = 10_000;
        let mut images = vec![image("close-old", 0.0, now - 1), image("far-new", 300.0, now)];
        sort_by_score(&mut images, now);
        assert_eq!(images[0].id, "far-new");
    }

    #[test]
    fn ties_keep_input_order() {
        let now = 50;
        let mut images = vec![image("x", 10.0, now), image("y", 10.0, now), image("z", 1.0, now)];
        sort_by_score(&mut images, now);
        let ids: Vec<&str> = images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }
}
