use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS layers (
            id         TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            is_visible INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS anchors (
            id        TEXT PRIMARY KEY,
            x         REAL NOT NULL,
            y         REAL NOT NULL,
            z         REAL NOT NULL,
            timestamp INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS annotations (
            id              TEXT PRIMARY KEY,
            annotation_type TEXT NOT NULL DEFAULT 'text',
            title           TEXT,
            content_text    TEXT,
            x               REAL NOT NULL,
            y               REAL NOT NULL,
            z               REAL NOT NULL,
            layer_id        TEXT NOT NULL REFERENCES layers(id),
            owner_id        TEXT NOT NULL DEFAULT '',
            anchor_id       TEXT,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ann_layer ON annotations(layer_id);
        CREATE INDEX IF NOT EXISTS idx_ann_anchor ON annotations(anchor_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    tracing::info!("schema initialized (version {SCHEMA_VERSION})");
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
