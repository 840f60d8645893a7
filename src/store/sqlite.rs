//! SQLite-backed image store.
//!
//! A single database file holds the region registry and every harvested
//! image. `query_near` ranks inside SQLite with the `geo_distance` scalar
//! function and returns only the requested window; ties resolve by rowid,
//! which upserts preserve, so they follow insertion order.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use han_collectors::{Coordinate, Image};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::Store;
use crate::error::{HanError, Result};

const IMAGE_COLUMNS: &str = "id, caption, created_time, image_url, thumbnail_url, link, \
     username, lat, lng, region_lat, region_lng, source, deleted, deleted_reason";

const UPSERT_SQL: &str = "INSERT INTO images (id, caption, created_time, image_url, \
     thumbnail_url, link, username, lat, lng, region_lat, region_lng, source) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
     ON CONFLICT(id) DO UPDATE SET caption = excluded.caption, \
     created_time = excluded.created_time, image_url = excluded.image_url, \
     thumbnail_url = excluded.thumbnail_url, link = excluded.link, \
     username = excluded.username, lat = excluded.lat, lng = excluded.lng, \
     region_lat = excluded.region_lat, region_lng = excluded.region_lng, \
     source = excluded.source";

/// SQLite-backed [`Store`].
///
/// Thread-safe via an internal `Mutex<Connection>`; all access is
/// serialized.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent
    /// directories and applying the schema as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        register_geo_distance(&conn)?;
        tracing::debug!(path = %path.display(), "image store opened");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HanError::Store(format!("lock poisoned: {e}")))
    }

    fn select_images(conn: &Connection, filter: &str) -> Result<Vec<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images {filter} ORDER BY rowid");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_image)?;

        let mut images = Vec::new();
        for r in rows {
            images.push(r?);
        }
        Ok(images)
    }
}

/// `geo_distance(lat1, lng1, lat2, lng2)`: great-circle meters, computed
/// exactly as [`Coordinate::distance_to`] so both stores rank identically.
fn register_geo_distance(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "geo_distance",
        4,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let from = Coordinate::new(ctx.get::<f64>(0)?, ctx.get::<f64>(1)?);
            let to = Coordinate::new(ctx.get::<f64>(2)?, ctx.get::<f64>(3)?);
            Ok(from.distance_to(&to))
        },
    )
}

/// Clamp a window bound into SQLite's signed integer range.
fn sql_bound(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn upsert(conn: &Connection, image: &Image) -> rusqlite::Result<()> {
    conn.execute(
        UPSERT_SQL,
        params![
            image.id,
            image.caption,
            image.created_time,
            image.image_url,
            image.thumbnail_url,
            image.link,
            image.username,
            image.location.lat,
            image.location.lng,
            image.region.map(|r| r.lat),
            image.region.map(|r| r.lng),
            image.source,
        ],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn regions(&self) -> Result<Vec<Coordinate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT lat, lng FROM regions ORDER BY seq")?;
        let rows = stmt.query_map([], |row| Ok(Coordinate::new(row.get(0)?, row.get(1)?)))?;

        let mut regions = Vec::new();
        for r in rows {
            regions.push(r?);
        }
        Ok(regions)
    }

    fn add_region(&self, center: Coordinate) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO regions (lat, lng) VALUES (?1, ?2)",
            params![center.lat, center.lng],
        )?;
        Ok(())
    }

    fn add_image(&self, image: Image) -> Result<()> {
        let conn = self.lock()?;
        upsert(&conn, &image)?;
        Ok(())
    }

    fn add_bulk_images(&self, images: &[Image], region: Coordinate) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for image in images {
            let mut tagged = image.clone();
            tagged.region = Some(region);
            upsert(&tx, &tagged)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn query_near(&self, coord: Coordinate, start: usize, end: usize) -> Result<Vec<Image>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {IMAGE_COLUMNS}, geo_distance(?1, ?2, lat, lng) AS distance \
             FROM images WHERE deleted = 0 \
             ORDER BY distance ASC, rowid ASC LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![coord.lat, coord.lng, sql_bound(end - start), sql_bound(start)],
            |row| Ok(row_to_image(row)?.with_distance(row.get(14)?)),
        )?;

        let mut images = Vec::new();
        for r in rows {
            images.push(r?);
        }
        Ok(images)
    }

    fn all_images(&self) -> Result<Vec<Image>> {
        let conn = self.lock()?;
        Self::select_images(&conn, "")
    }

    fn soft_delete(&self, id: &str, reason: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE images SET deleted = 1, deleted_reason = ?2 WHERE id = ?1",
            params![id, reason],
        )?;
        Ok(changed > 0)
    }

    fn size(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn delete_oldest(&self, n: usize) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        let limit = sql_bound(n);
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM images WHERE rowid IN \
             (SELECT rowid FROM images ORDER BY created_time ASC, rowid ASC LIMIT ?1)",
            params![limit],
        )?;
        Ok(removed)
    }
}

impl SqliteStore {
    /// Look up one image by id.
    pub fn get(&self, id: &str) -> Result<Option<Image>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_image).optional()?)
    }
}

fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<Image> {
    let region_lat: Option<f64> = row.get(9)?;
    let region_lng: Option<f64> = row.get(10)?;
    let deleted: i64 = row.get(12)?;

    let mut image = Image::new(
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get(2)?,
        Coordinate::new(row.get(7)?, row.get(8)?),
        row.get::<_, String>(11)?,
    )
    .with_urls(row.get::<_, String>(3)?, row.get::<_, String>(4)?)
    .with_attribution(row.get::<_, String>(5)?, row.get::<_, String>(6)?);

    image.region = region_lat.zip(region_lng).map(|(lat, lng)| Coordinate::new(lat, lng));
    image.deleted = deleted != 0;
    image.deleted_reason = row.get(13)?;
    Ok(image)
}
