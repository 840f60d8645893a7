//! Watched region registry.
//!
//! A region is a fixed-radius circle around a registered center. Images
//! are harvested per region, and a feed request outside every region
//! creates a new one.
//!
//! `add_region_if_absent` checks then inserts without cross-caller locking:
//! two simultaneous requests for nearby points can both register a region.

use std::sync::Arc;

use han_collectors::Coordinate;

use crate::error::{HanError, Result};
use crate::store::Store;

/// Radius of every region, in meters.
pub const REGION_RADIUS_METERS: f64 = 5000.0;

/// Answers coverage questions against the store's region registry.
#[derive(Clone)]
pub struct RegionResolver {
    store: Arc<dyn Store>,
}

impl RegionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `true` if some region center lies within [`REGION_RADIUS_METERS`]
    /// of `coord`.
    pub fn contains_region(&self, coord: Coordinate) -> Result<bool> {
        Ok(self.get_region(coord)?.is_some())
    }

    /// The first region, in registry order, that covers `coord`.
    pub fn get_region(&self, coord: Coordinate) -> Result<Option<Coordinate>> {
        let regions = self.store.regions()?;
        Ok(regions
            .into_iter()
            .find(|center| center.distance_to(&coord) <= REGION_RADIUS_METERS))
    }

    /// Register `coord` as a region center unless one already covers it.
    /// Returns whether a region was added.
    ///
    /// # Errors
    ///
    /// Returns [`HanError::Validation`] for an invalid coordinate.
    pub fn add_region_if_absent(&self, coord: Coordinate) -> Result<bool> {
        if !coord.is_valid() {
            return Err(HanError::Validation(format!("invalid coordinate {coord}")));
        }
        if self.contains_region(coord)? {
            return Ok(false);
        }
        self.store.add_region(coord)?;
        tracing::info!(%coord, "new region registered");
        Ok(true)
    }

    /// Every registered region center.
    pub fn regions(&self) -> Result<Vec<Coordinate>> {
        self.store.regions()
    }
}
