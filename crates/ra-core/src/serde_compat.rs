//! JSON serde for the anchor-set wire format.
//!
//! The wire format uses camelCase field names, string ids, and stores
//! positions as `[x, y, z]` arrays. Ids must parse: annotations saved
//! elsewhere refer to them, so a bad id is an error rather than a fresh id.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorData, AnchorId, AnchorStore};
use crate::time::{Timestamp, now_iso8601};
use crate::vector::Vec3;

pub const CURRENT_VERSION: &str = "1.0";

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct WireExport {
    pub version: String,
    #[serde(rename = "exportedAt", default)]
    pub exported_at: String,
    pub anchors: Vec<WireAnchor>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireAnchor {
    pub id: String,
    pub position: [f64; 3],
    /// Creation time, Unix milliseconds. Accepts "createdAt" as well.
    #[serde(alias = "createdAt")]
    pub timestamp: Timestamp,
}

impl WireExport {
    pub fn from_anchor_data(data: &[AnchorData]) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            exported_at: now_iso8601(),
            anchors: data
                .iter()
                .map(|a| WireAnchor {
                    id: a.id.to_string(),
                    position: a.position.to_array(),
                    timestamp: a.timestamp,
                })
                .collect(),
        }
    }

    pub fn into_anchor_data(self) -> Result<Vec<AnchorData>, serde_json::Error> {
        self.anchors
            .into_iter()
            .map(|w| {
                let id = AnchorId::parse(&w.id).map_err(|e| {
                    serde_json::Error::custom(format!("invalid anchor id '{}': {e}", w.id))
                })?;
                Ok(AnchorData {
                    id,
                    position: Vec3::from_array(w.position),
                    timestamp: w.timestamp,
                })
            })
            .collect()
    }
}

/// Serialize every anchor in the store to the JSON wire format.
pub fn export_json(store: &AnchorStore) -> Result<String, serde_json::Error> {
    export_anchor_data_json(&store.anchor_data())
}

/// Serialize an anchor-data list to the JSON wire format.
pub fn export_anchor_data_json(data: &[AnchorData]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireExport::from_anchor_data(data))
}

/// Parse the JSON wire format into anchor data ready for
/// [`AnchorStore::restore_from_anchor_data`].
pub fn import_json(json: &str) -> Result<Vec<AnchorData>, serde_json::Error> {
    let wire: WireExport = serde_json::from_str(json)?;
    wire.into_anchor_data()
}
