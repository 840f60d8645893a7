//! In-process image store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use han_collectors::{Coordinate, Image};

use super::{Store, rank_by_distance};
use crate::error::{HanError, Result};

#[derive(Default)]
struct Inner {
    regions: Vec<Coordinate>,
    /// Images in insertion order; upserts replace in place.
    images: Vec<Image>,
    index: HashMap<String, usize>,
}

impl Inner {
    fn upsert(&mut self, mut image: Image) {
        match self.index.get(&image.id) {
            Some(&pos) => {
                let existing = &mut self.images[pos];
                // Reported images stay hidden when a source returns them again.
                image.deleted = existing.deleted;
                image.deleted_reason = existing.deleted_reason.take();
                *existing = image;
            }
            None => {
                self.index.insert(image.id.clone(), self.images.len());
                self.images.push(image);
            }
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .images
            .iter()
            .enumerate()
            .map(|(pos, image)| (image.id.clone(), pos))
            .collect();
    }
}

/// A [`Store`] held entirely in memory behind a `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| HanError::Store(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| HanError::Store(format!("lock poisoned: {e}")))
    }
}

impl Store for MemoryStore {
    fn regions(&self) -> Result<Vec<Coordinate>> {
        Ok(self.read()?.regions.clone())
    }

    fn add_region(&self, center: Coordinate) -> Result<()> {
        self.write()?.regions.push(center);
        Ok(())
    }

    fn add_image(&self, image: Image) -> Result<()> {
        self.write()?.upsert(image);
        Ok(())
    }

    fn add_bulk_images(&self, images: &[Image], region: Coordinate) -> Result<()> {
        let mut inner = self.write()?;
        for image in images {
            let mut image = image.clone();
            image.region = Some(region);
            image.distance = 0.0;
            inner.upsert(image);
        }
        Ok(())
    }

    fn query_near(&self, coord: Coordinate, start: usize, end: usize) -> Result<Vec<Image>> {
        let inner = self.read()?;
        let visible = inner.images.iter().filter(|image| !image.deleted);
        Ok(rank_by_distance(visible, coord, start, end))
    }

    fn all_images(&self) -> Result<Vec<Image>> {
        Ok(self.read()?.images.clone())
    }

    fn soft_delete(&self, id: &str, reason: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let Some(&pos) = inner.index.get(id) else {
            return Ok(false);
        };
        let image = &mut inner.images[pos];
        image.deleted = true;
        image.deleted_reason = Some(reason.to_owned());
        Ok(true)
    }

    fn size(&self) -> Result<usize> {
        Ok(self.read()?.images.len())
    }

    fn delete_oldest(&self, n: usize) -> Result<usize> {
        let mut inner = self.write()?;
        if n == 0 || inner.images.is_empty() {
            return Ok(0);
        }

        let mut by_age: Vec<(i64, usize)> = inner
            .images
            .iter()
            .enumerate()
            .map(|(pos, image)| (image.created_time, pos))
            .collect();
        by_age.sort_unstable();
        let mut doomed: Vec<usize> = by_age.into_iter().take(n).map(|(_, pos)| pos).collect();
        doomed.sort_unstable();

        let removed = doomed.len();
        let mut doomed = doomed.into_iter().peekable();
        let mut pos = 0;
        inner.images.retain(|_| {
            let keep = doomed.peek() != Some(&pos);
            if !keep {
                doomed.next();
            }
            pos += 1;
            keep
        });
        inner.reindex();
        Ok(removed)
    }
}
