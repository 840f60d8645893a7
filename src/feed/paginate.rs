//! Ranked pagination over distance-sorted store chunks.
//!
//! The store can only order by distance, so blended ranking happens in
//! process. Every store read covers exactly one `sample_size`-aligned
//! chunk, which is re-sorted by [`score`](super::score) and then sliced.
//! Because chunk boundaries never move, any two windows aligned to
//! `sample_size` compose without duplicates or gaps.
//!
//! Callers paging through one feed must keep `sample_size` fixed.

use std::sync::Arc;

use han_collectors::{Coordinate, Image};

use super::scoring::sort_by_score;
use crate::error::{HanError, Result};
use crate::store::Store;

/// Chunk size used when none is configured.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Widen `[start, end)` outwards to `sample_size` boundaries.
///
/// ```
/// use hanserver::feed::chunk_range;
/// assert_eq!(chunk_range(100, 10, 150), (0, 200));
/// assert_eq!(chunk_range(100, 110, 150), (100, 200));
/// ```
pub fn chunk_range(sample_size: usize, start: usize, end: usize) -> (usize, usize) {
    let start_sort = start / sample_size * sample_size;
    let end_sort = end.div_ceil(sample_size).saturating_mul(sample_size);
    (start_sort, end_sort)
}

/// Serves windows of the blended-score ordering around a coordinate.
pub struct RankedPaginator {
    store: Arc<dyn Store>,
    sample_size: usize,
}

impl RankedPaginator {
    /// # Errors
    ///
    /// Returns [`HanError::Config`] if `sample_size` is zero.
    pub fn new(store: Arc<dyn Store>, sample_size: usize) -> Result<Self> {
        if sample_size == 0 {
            return Err(HanError::Config("sample_size must be greater than 0".into()));
        }
        Ok(Self { store, sample_size })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Images `[start, end)` of the ranked feed around `coord`.
    ///
    /// A missing `start` is 0 and a missing `end` is `start + sample_size`.
    /// Inverted or out-of-range windows yield fewer (or no) images rather
    /// than an error.
    ///
    /// # Errors
    ///
    /// Returns [`HanError::Validation`] for an invalid coordinate, or
    /// [`HanError::Store`] if a chunk cannot be read.
    pub fn paginate(&self, coord: Coordinate, start: Option<usize>, end: Option<usize>) -> Result<Vec<Image>> {
        self.paginate_at(coord, start, end, chrono::Utc::now().timestamp())
    }

    /// [`paginate`](Self::paginate) with recency measured from `now`.
    pub fn paginate_at(
        &self,
        coord: Coordinate,
        start: Option<usize>,
        end: Option<usize>,
        now: i64,
    ) -> Result<Vec<Image>> {
        if !coord.is_valid() {
            return Err(HanError::Validation(format!("invalid coordinate {coord}")));
        }

        let start = start.unwrap_or(0);
        let end = end.unwrap_or_else(|| start.saturating_add(self.sample_size));
        if end <= start {
            return Ok(Vec::new());
        }

        let (mut chunk_start, _) = chunk_range(self.sample_size, start, end);
        // `end` comes from the client; never size by it.
        let mut images = Vec::with_capacity((end - start).min(self.sample_size));

        // A window ending on a boundary never opens the chunk starting there.
        while chunk_start < end {
            let chunk_end = chunk_start.saturating_add(self.sample_size);
            let chunk = self.sorted_chunk(coord, chunk_start, chunk_end, now)?;
            let fetched = chunk.len();

            let lo = (start.max(chunk_start) - chunk_start).min(fetched);
            let hi = (end.min(chunk_end) - chunk_start).min(fetched);
            images.extend(chunk.into_iter().skip(lo).take(hi - lo));

            if fetched < self.sample_size {
                // Store exhausted.
                break;
            }
            chunk_start = chunk_end;
        }

        tracing::trace!(%coord, start, end, returned = images.len(), "feed page served");
        Ok(images)
    }

    fn sorted_chunk(&self, coord: Coordinate, start: usize, end: usize, now: i64) -> Result<Vec<Image>> {
        let mut chunk = self.store.query_near(coord, start, end)?;
        sort_by_score(&mut chunk, now);
        Ok(chunk)
    }
}
