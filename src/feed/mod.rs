//! Ranked feed over stored images.

pub mod paginate;
pub mod scoring;

pub use paginate::{DEFAULT_SAMPLE_SIZE, RankedPaginator, chunk_range};
pub use scoring::{RECENCY_BIAS, score, sort_by_score};
