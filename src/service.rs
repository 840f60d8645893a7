//! Request-level feed operations shared by the HTTP API and tests.

use std::sync::Arc;

use han_collectors::{Coordinate, Image};

use crate::error::{HanError, Result};
use crate::feed::RankedPaginator;
use crate::harvest::HarvestOrchestrator;
use crate::region::RegionResolver;
use crate::reporting::{ErrorSink, report};
use crate::store::Store;

/// Ties the store, region registry, harvester and paginator together.
pub struct FeedService {
    store: Arc<dyn Store>,
    regions: RegionResolver,
    paginator: Arc<RankedPaginator>,
    orchestrator: Arc<HarvestOrchestrator>,
    sink: Option<Arc<dyn ErrorSink>>,
    background_harvest: bool,
}

impl FeedService {
    /// # Errors
    ///
    /// Returns [`HanError::Config`] if `sample_size` is zero.
    pub fn new(
        orchestrator: Arc<HarvestOrchestrator>,
        sink: Option<Arc<dyn ErrorSink>>,
        sample_size: usize,
        background_harvest: bool,
    ) -> Result<Self> {
        let store = Arc::clone(orchestrator.store());
        Ok(Self {
            regions: RegionResolver::new(Arc::clone(&store)),
            paginator: Arc::new(RankedPaginator::new(Arc::clone(&store), sample_size)?),
            store,
            orchestrator,
            sink,
            background_harvest,
        })
    }

    pub fn orchestrator(&self) -> &Arc<HarvestOrchestrator> {
        &self.orchestrator
    }

    /// The ranked feed around `coord`.
    ///
    /// A coordinate outside every region first registers a region and
    /// harvests it, either before answering or in the background. A failed
    /// harvest is not an error; the feed is served from whatever is stored.
    pub async fn image_search(&self, coord: Coordinate, start: Option<usize>, end: Option<usize>) -> Result<Vec<Image>> {
        if !coord.is_valid() {
            return Err(HanError::Validation(format!("invalid coordinate {coord}")));
        }

        let regions = self.regions.clone();
        if blocking(move || regions.add_region_if_absent(coord)).await? {
            self.populate(coord).await;
        }

        let paginator = Arc::clone(&self.paginator);
        blocking(move || paginator.paginate(coord, start, end)).await
    }

    async fn populate(&self, coord: Coordinate) {
        if self.background_harvest {
            self.orchestrator.spawn_harvest(coord);
            return;
        }
        match self.orchestrator.harvest(coord).await {
            Ok(outcome) if !outcome.is_success() => {
                tracing::warn!(%coord, "new region harvested no images");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(%coord, error = %e, "new region harvest failed"),
        }
    }

    /// Hide an image from feeds and notify the sink.
    pub async fn report_image(&self, id: &str, reason: &str) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let (owned_id, owned_reason) = (id.to_owned(), reason.to_owned());
        let found = blocking(move || store.soft_delete(&owned_id, &owned_reason)).await?;
        let message = format!("Image {id} reported because: {reason}");
        tracing::info!(found, "{message}");
        report(self.sink.as_ref(), &message).await;
        Ok(found)
    }

    pub fn regions(&self) -> Result<Vec<Coordinate>> {
        self.regions.regions()
    }
}

/// Run a synchronous store operation on the blocking pool.
async fn blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| HanError::Store(format!("store task failed: {e}")))?
}
