//! SQLite DDL for the image store.

use rusqlite::Connection;

/// Bumped whenever the DDL below changes shape.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the image database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Concurrent reads while straggling harvests write.
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS regions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    lat REAL NOT NULL,
    lng REAL NOT NULL
);

-- Upserts use ON CONFLICT DO UPDATE so an image keeps its rowid, and
-- with it its place in the insertion order that breaks distance ties.
CREATE TABLE IF NOT EXISTS images (
    id             TEXT PRIMARY KEY,
    caption        TEXT NOT NULL DEFAULT '',
    created_time   INTEGER NOT NULL DEFAULT 0,
    image_url      TEXT NOT NULL DEFAULT '',
    thumbnail_url  TEXT NOT NULL DEFAULT '',
    link           TEXT NOT NULL DEFAULT '',
    username       TEXT NOT NULL DEFAULT '',
    lat            REAL NOT NULL,
    lng            REAL NOT NULL,
    region_lat     REAL,
    region_lng     REAL,
    source         TEXT NOT NULL DEFAULT '',
    deleted        INTEGER NOT NULL DEFAULT 0,
    deleted_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_images_created_time ON images(created_time);
CREATE INDEX IF NOT EXISTS idx_images_deleted      ON images(deleted);
"#;

/// Apply the full schema to an open connection and seed the version stamp.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Returns `None` if the version stamp is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
