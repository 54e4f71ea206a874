use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use ra_core::{AnchorData, AnchorId, Annotation, AnnotationType, Layer, Vec3};

use crate::error::{Result, StoreError};
use crate::schema;

pub struct Store {
    conn: Connection,
}

const ANNOTATION_COLUMNS: &str = "id, annotation_type, title, content_text, x, y, z, \
     layer_id, owner_id, anchor_id, created_at, updated_at";

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Anchors ---

    /// Replace the stored anchor set with `anchors`.
    pub fn save_anchors(&self, anchors: &[AnchorData]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_anchors(&tx, anchors)?;
        tx.commit()?;
        tracing::debug!("saved {} anchors", anchors.len());
        Ok(())
    }

    /// Every stored anchor, oldest first.
    pub fn load_anchors(&self) -> Result<Vec<AnchorData>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, x, y, z, timestamp FROM anchors ORDER BY timestamp, id")?;
        let rows: Vec<(String, f64, f64, f64, i64)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, x, y, z, timestamp)| {
                Ok(AnchorData {
                    id: parse_anchor_id(&id)?,
                    position: Vec3::new(x, y, z),
                    timestamp: from_sql_millis(timestamp, "anchor timestamp")?,
                })
            })
            .collect()
    }

    pub fn anchor_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM anchors", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // --- Annotations ---

    /// Insert or replace an annotation by id.
    pub fn upsert_annotation(&self, annotation: &Annotation) -> Result<()> {
        write_annotation(&self.conn, annotation)
    }

    /// Store a newly placed annotation together with the anchor set it was
    /// bound against. Either both land or neither does.
    pub fn save_placement(&self, annotation: &Annotation, anchors: &[AnchorData]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_anchors(&tx, anchors)?;
        write_annotation(&tx, annotation)?;
        tx.commit()?;
        tracing::debug!(
            "saved annotation {} with {} anchors",
            annotation.id,
            anchors.len()
        );
        Ok(())
    }

    /// All annotations in creation order.
    pub fn load_annotations(&self) -> Result<Vec<Annotation>> {
        let sql = format!("SELECT {ANNOTATION_COLUMNS} FROM annotations ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows: Vec<AnnotationRow> = stmt
            .query_map([], AnnotationRow::from_row)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(AnnotationRow::into_annotation).collect()
    }

    pub fn get_annotation(&self, id: Uuid) -> Result<Option<Annotation>> {
        let sql = format!("SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, [id.to_string()], AnnotationRow::from_row)
            .optional()?;
        row.map(AnnotationRow::into_annotation).transpose()
    }

    /// Returns whether a row was removed.
    pub fn delete_annotation(&self, id: Uuid) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM annotations WHERE id = ?1", [id.to_string()])?;
        Ok(n > 0)
    }

    pub fn annotation_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // --- Layers ---

    /// The layer named "Default", created on first use.
    pub fn default_layer(&self) -> Result<Layer> {
        if let Some(layer) = self
            .load_layers()?
            .into_iter()
            .find(|l| l.name == Layer::DEFAULT_NAME)
        {
            return Ok(layer);
        }
        let layer = Layer::new(Layer::DEFAULT_NAME);
        self.conn.execute(
            "INSERT INTO layers (id, name, is_visible) VALUES (?1, ?2, ?3)",
            params![layer.id.to_string(), layer.name, layer.is_visible as i32],
        )?;
        tracing::info!("created default layer {}", layer.id);
        Ok(layer)
    }

    pub fn load_layers(&self) -> Result<Vec<Layer>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, is_visible FROM layers ORDER BY rowid")?;
        let rows: Vec<(String, String, bool)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i32>(2)? != 0))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, name, is_visible)| {
                Ok(Layer {
                    id: parse_uuid(&id)?,
                    name,
                    is_visible,
                })
            })
            .collect()
    }

    /// Returns whether the layer exists.
    pub fn set_layer_visible(&self, id: Uuid, visible: bool) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE layers SET is_visible = ?1 WHERE id = ?2",
            params![visible as i32, id.to_string()],
        )?;
        Ok(n > 0)
    }
}

struct AnnotationRow {
    id: String,
    annotation_type: String,
    title: Option<String>,
    content_text: Option<String>,
    position: Vec3,
    layer_id: String,
    owner_id: String,
    anchor_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl AnnotationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            annotation_type: row.get(1)?,
            title: row.get(2)?,
            content_text: row.get(3)?,
            position: Vec3::new(row.get(4)?, row.get(5)?, row.get(6)?),
            layer_id: row.get(7)?,
            owner_id: row.get(8)?,
            anchor_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_annotation(self) -> Result<Annotation> {
        Ok(Annotation {
            id: parse_uuid(&self.id)?,
            annotation_type: AnnotationType::from_str_lossy(&self.annotation_type),
            title: self.title,
            content_text: self.content_text,
            position: self.position,
            layer_id: parse_uuid(&self.layer_id)?,
            owner_id: self.owner_id,
            anchor_id: self.anchor_id.as_deref().map(parse_anchor_id).transpose()?,
            created_at: from_sql_millis(self.created_at, "created_at")?,
            updated_at: from_sql_millis(self.updated_at, "updated_at")?,
        })
    }
}

fn write_anchors(conn: &Connection, anchors: &[AnchorData]) -> Result<()> {
    conn.execute("DELETE FROM anchors", [])?;
    let mut insert =
        conn.prepare("INSERT INTO anchors (id, x, y, z, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)")?;
    for a in anchors {
        insert.execute(params![
            a.id.to_string(),
            a.position.x,
            a.position.y,
            a.position.z,
            to_sql_millis(a.timestamp, "anchor timestamp")?,
        ])?;
    }
    Ok(())
}

fn write_annotation(conn: &Connection, annotation: &Annotation) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO annotations (id, annotation_type, title, content_text,
             x, y, z, layer_id, owner_id, anchor_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            annotation.id.to_string(),
            annotation.annotation_type.as_str(),
            annotation.title,
            annotation.content_text,
            annotation.position.x,
            annotation.position.y,
            annotation.position.z,
            annotation.layer_id.to_string(),
            annotation.owner_id,
            annotation.anchor_id.map(|a| a.to_string()),
            to_sql_millis(annotation.created_at, "created_at")?,
            to_sql_millis(annotation.updated_at, "updated_at")?,
        ],
    )?;
    Ok(())
}

/// SQLite integers are signed; millisecond values past `i64::MAX` are refused.
fn to_sql_millis(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{field} {value} does not fit in SQLite")))
}

fn from_sql_millis(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative {field} {value}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}

fn parse_anchor_id(s: &str) -> Result<AnchorId> {
    parse_uuid(s).map(AnchorId)
}
