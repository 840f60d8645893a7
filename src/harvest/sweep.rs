//! Periodic re-harvesting of every watched region.

use std::slice;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use han_collectors::Coordinate;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::orchestrator::{HarvestOrchestrator, HarvestOutcome, HarvestSource};
use crate::error::Result;
use crate::region::RegionResolver;

/// Region watched when the registry is empty (San Francisco).
pub const DEFAULT_REGION: Coordinate = Coordinate::new(37.769950, -122.448226);

impl HarvestOrchestrator {
    /// Harvest every registered region once, regions in parallel.
    ///
    /// Per-region failures are logged and returned alongside successes; one
    /// region failing never stops the others.
    pub async fn sweep_once(&self) -> Result<Vec<(Coordinate, Result<HarvestOutcome>)>> {
        let regions = self.store().regions()?;
        tracing::info!(regions = regions.len(), "sweeping all regions");

        let outcomes = join_all(regions.iter().map(|&region| self.harvest(region))).await;
        Ok(regions.into_iter().zip(outcomes).collect())
    }

    /// Harvest every registered region with `source` alone, in sequence.
    async fn sweep_source(&self, source: &HarvestSource, cancel: &CancellationToken) -> Result<()> {
        let regions = self.store().regions()?;
        for region in regions {
            if cancel.is_cancelled() {
                break;
            }
            match self.harvest_with(region, slice::from_ref(source)).await {
                Ok(HarvestOutcome::Succeeded { images, .. }) => {
                    tracing::debug!(source = %source.name(), %region, images, "region refreshed");
                }
                Ok(HarvestOutcome::QuorumFailure { .. }) => {
                    tracing::debug!(source = %source.name(), %region, "region not refreshed");
                }
                Err(e) => {
                    tracing::warn!(source = %source.name(), %region, error = %e, "region sweep failed");
                }
            }
        }
        Ok(())
    }
}

/// Register [`DEFAULT_REGION`] if no region exists yet.
pub fn ensure_default_region(resolver: &RegionResolver) -> Result<()> {
    if resolver.regions()?.is_empty() {
        resolver.add_region_if_absent(DEFAULT_REGION)?;
    }
    Ok(())
}

/// Re-harvest every region on each enabled source's own schedule until
/// `cancel` fires.
///
/// Each source sweeps immediately, then every `update_frequency_secs`,
/// independent of the other sources. Regions are re-read on every tick so
/// regions created by feed requests are picked up.
pub async fn run_sweeps(orchestrator: Arc<HarvestOrchestrator>, cancel: CancellationToken) -> Result<()> {
    let resolver = RegionResolver::new(Arc::clone(orchestrator.store()));
    ensure_default_region(&resolver)?;

    let loops = orchestrator
        .sources()
        .iter()
        .filter(|s| s.is_enabled())
        .map(|source| source_loop(&orchestrator, source, &cancel));
    join_all(loops).await;

    tracing::info!("sweeps stopped");
    Ok(())
}

async fn source_loop(orchestrator: &HarvestOrchestrator, source: &HarvestSource, cancel: &CancellationToken) {
    let period = Duration::from_secs(source.collector.config().update_frequency_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(source = %source.name(), every_secs = period.as_secs(), "sweep loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Err(e) = orchestrator.sweep_source(source, cancel).await {
            tracing::error!(source = %source.name(), error = %e, "failed to read regions");
        }
    }
}
