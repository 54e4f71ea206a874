use std::fs;
use std::path::Path;

use ra_core::{AnchorData, export_anchor_data_json, import_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import an anchor export file, replacing the stored anchor set.
    /// Returns the number of anchors imported.
    pub fn import_anchors_json_file(&self, path: &Path) -> Result<usize> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_anchors_json_str(&json)
    }

    pub fn import_anchors_json_str(&self, json: &str) -> Result<usize> {
        let anchors = parse_anchors(json)?;
        self.save_anchors(&anchors)?;
        tracing::info!("imported {} anchors", anchors.len());
        Ok(anchors.len())
    }

    pub fn export_anchors_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_anchors_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_anchors_json_string(&self) -> Result<String> {
        let anchors = self.load_anchors()?;
        export_anchor_data_json(&anchors)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }
}

fn parse_anchors(json: &str) -> Result<Vec<AnchorData>> {
    import_json(json).map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_core::{AnchorStore, ManualClock, Vec3, export_json};
    use std::sync::Arc;

    fn populated() -> AnchorStore {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let anchors = AnchorStore::with_clock(clock.clone());
        for x in [0.0, 3.0, -6.5] {
            anchors.anchor_for(Vec3::new(x, 1.25, 1.0 / 3.0)).unwrap();
            clock.advance(10);
        }
        anchors
    }

    #[test]
    fn test_import_export_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let source = populated();
        let json = export_json(&source).unwrap();

        assert_eq!(store.import_anchors_json_str(&json).unwrap(), 3);
        let exported = store.export_anchors_json_string().unwrap();

        let restored = AnchorStore::new();
        restored.restore_from_anchor_data(&import_json(&exported).unwrap());
        assert_eq!(restored.anchor_data(), source.anchor_data());
    }

    #[test]
    fn test_import_replaces_existing() {
        let store = Store::open_in_memory().unwrap();
        store
            .import_anchors_json_str(&export_json(&populated()).unwrap())
            .unwrap();
        let single = AnchorStore::new();
        single.anchor_for(Vec3::ZERO).unwrap();
        store
            .import_anchors_json_str(&export_json(&single).unwrap())
            .unwrap();
        assert_eq!(store.load_anchors().unwrap(), single.anchor_data());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let store = Store::open_in_memory().unwrap();
        store
            .import_anchors_json_str(&export_json(&populated()).unwrap())
            .unwrap();
        let result = store.import_anchors_json_str("{not json");
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
        // Failed import leaves the stored set untouched
        assert_eq!(store.anchor_count().unwrap(), 3);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors.json");
        let store = Store::open_in_memory().unwrap();
        store
            .import_anchors_json_str(&export_json(&populated()).unwrap())
            .unwrap();
        store.export_anchors_json_file(&path).unwrap();

        let other = Store::open_in_memory().unwrap();
        assert_eq!(other.import_anchors_json_file(&path).unwrap(), 3);
        assert_eq!(other.load_anchors().unwrap(), store.load_anchors().unwrap());
    }

    #[test]
    fn test_missing_file() {
        let store = Store::open_in_memory().unwrap();
        let result = store.import_anchors_json_file(Path::new("/nonexistent/anchors.json"));
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }
}
