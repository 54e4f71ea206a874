//! Spatial anchors with distance-based reuse.
//!
//! Placement requests arrive continuously; the store folds them onto a
//! minimal set of anchors. A request reuses the nearest anchor strictly
//! closer than [`ANCHOR_REUSE_RADIUS`], otherwise a new anchor is created.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::ANCHOR_REUSE_RADIUS;
use crate::time::{Clock, SystemClock, Timestamp};
use crate::vector::Vec3;

/// Stable anchor identifier. Annotations hold these as weak references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A fixed point in world space that annotations attach to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    pub position: Vec3,
    pub created_at: Timestamp,
}

/// Persisted form of an [`Anchor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorData {
    pub id: AnchorId,
    pub position: Vec3,
    pub timestamp: Timestamp,
}

impl From<&Anchor> for AnchorData {
    fn from(anchor: &Anchor) -> Self {
        Self {
            id: anchor.id,
            position: anchor.position,
            timestamp: anchor.created_at,
        }
    }
}

impl From<AnchorData> for Anchor {
    fn from(data: AnchorData) -> Self {
        Self {
            id: data.id,
            position: data.position,
            created_at: data.timestamp,
        }
    }
}

type Cell = (i64, i64, i64);

/// Uniform hash grid with cell size equal to the reuse radius.
///
/// Any anchor closer than one cell size to a query point lies in the 3×3×3
/// block of cells around the query's cell.
#[derive(Default)]
struct SpatialGrid {
    cells: HashMap<Cell, HashSet<AnchorId>>,
}

impl SpatialGrid {
    fn cell_of(p: Vec3) -> Cell {
        // `as` saturates, and NaN maps to 0
        let c = |v: f64| (v / ANCHOR_REUSE_RADIUS).floor() as i64;
        (c(p.x), c(p.y), c(p.z))
    }

    fn insert(&mut self, id: AnchorId, p: Vec3) {
        self.cells.entry(Self::cell_of(p)).or_default().insert(id);
    }

    fn remove(&mut self, id: AnchorId, p: Vec3) {
        let cell = Self::cell_of(p);
        if let Some(ids) = self.cells.get_mut(&cell) {
            ids.remove(&id);
            if ids.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    fn clear(&mut self) {
        self.cells.clear();
    }

    fn neighbors(&self, p: Vec3) -> impl Iterator<Item = AnchorId> + '_ {
        let (cx, cy, cz) = Self::cell_of(p);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (dx, dy, dz))))
            .filter_map(move |(dx, dy, dz)| {
                self.cells.get(&(
                    cx.saturating_add(dx),
                    cy.saturating_add(dy),
                    cz.saturating_add(dz),
                ))
            })
            .flat_map(|ids| ids.iter().copied())
    }
}

#[derive(Default)]
struct AnchorSet {
    anchors: HashMap<AnchorId, Anchor>,
    grid: SpatialGrid,
}

impl AnchorSet {
    fn insert(&mut self, anchor: Anchor) {
        if let Some(old) = self.anchors.remove(&anchor.id) {
            self.grid.remove(old.id, old.position);
        }
        self.grid.insert(anchor.id, anchor.position);
        self.anchors.insert(anchor.id, anchor);
    }

    fn remove(&mut self, id: AnchorId) -> Option<Anchor> {
        let anchor = self.anchors.remove(&id)?;
        self.grid.remove(id, anchor.position);
        Some(anchor)
    }

    /// Nearest anchor strictly closer than `radius` (≤ reuse radius).
    fn nearest_within(&self, p: Vec3, radius: f64) -> Option<(&Anchor, f64)> {
        self.grid
            .neighbors(p)
            .filter_map(|id| self.anchors.get(&id))
            .map(|a| (a, a.position.distance(p)))
            .filter(|(_, d)| *d < radius)
            .min_by(|(a, da), (b, db)| compare_candidates(a, *da, b, *db))
    }

    fn nearest_any(&self, p: Vec3) -> Option<(&Anchor, f64)> {
        self.anchors
            .values()
            .map(|a| (a, a.position.distance(p)))
            .filter(|(_, d)| !d.is_nan())
            .min_by(|(a, da), (b, db)| compare_candidates(a, *da, b, *db))
    }
}

/// Nearest first; ties go to the older anchor, then the smaller id.
fn compare_candidates(a: &Anchor, da: f64, b: &Anchor, db: f64) -> Ordering {
    da.total_cmp(&db)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

fn creation_order(a: &Anchor, b: &Anchor) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

/// Owns every live anchor.
///
/// All operations serialize on one internal lock, so two concurrent
/// `anchor_for` calls at nearby points cannot both miss and create duplicates.
pub struct AnchorStore {
    inner: Mutex<AnchorSet>,
    clock: Arc<dyn Clock>,
}

impl Default for AnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnchorStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(AnchorSet::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AnchorSet> {
        // Mutations never leave the map and grid half-updated across a panic point.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Id of the nearest anchor closer than the reuse radius, creating one at
    /// `position` if none qualifies. `None` for a non-finite position, which
    /// can neither match nor be stored.
    pub fn anchor_for(&self, position: Vec3) -> Option<AnchorId> {
        self.resolve(position).map(|(id, _)| id)
    }

    /// Like [`anchor_for`](Self::anchor_for), also reporting whether an
    /// existing anchor was reused.
    pub fn resolve(&self, position: Vec3) -> Option<(AnchorId, bool)> {
        if !position.is_finite() {
            tracing::warn!("refusing to anchor non-finite position {position:?}");
            return None;
        }
        let mut set = self.lock();
        if let Some((anchor, distance)) = set.nearest_within(position, ANCHOR_REUSE_RADIUS) {
            tracing::trace!("reusing anchor {} at {distance:.3}m", anchor.id);
            return Some((anchor.id, true));
        }

        let anchor = Anchor {
            id: AnchorId::new(),
            position,
            created_at: self.clock.now_millis(),
        };
        let id = anchor.id;
        tracing::debug!(
            "created anchor {id} at ({:.3}, {:.3}, {:.3})",
            position.x,
            position.y,
            position.z
        );
        set.insert(anchor);
        Some((id, false))
    }

    pub fn get_anchor(&self, id: AnchorId) -> Option<Anchor> {
        self.lock().anchors.get(&id).cloned()
    }

    pub fn contains(&self, id: AnchorId) -> bool {
        self.lock().anchors.contains_key(&id)
    }

    /// Snapshot of all anchors, oldest first.
    pub fn all_anchors(&self) -> Vec<Anchor> {
        let mut anchors: Vec<Anchor> = self.lock().anchors.values().cloned().collect();
        anchors.sort_by(creation_order);
        anchors
    }

    /// Nearest anchor within `max_distance` (inclusive), without creating one.
    pub fn nearest_anchor(&self, position: Vec3, max_distance: f64) -> Option<(Anchor, f64)> {
        self.lock()
            .nearest_any(position)
            .filter(|(_, d)| *d <= max_distance)
            .map(|(a, d)| (a.clone(), d))
    }

    /// Remove an anchor. Returns whether it existed.
    pub fn remove_anchor(&self, id: AnchorId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::debug!("removed anchor {id}");
        }
        removed
    }

    pub fn clear_all_anchors(&self) {
        let mut set = self.lock();
        set.anchors.clear();
        set.grid.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().anchors.is_empty()
    }

    /// Export every anchor for persistence, oldest first.
    pub fn anchor_data(&self) -> Vec<AnchorData> {
        self.all_anchors().iter().map(AnchorData::from).collect()
    }

    /// Merge previously exported anchors back in, keeping their ids.
    /// An entry whose id is already present replaces that anchor.
    pub fn restore_from_anchor_data(&self, data: &[AnchorData]) {
        let mut set = self.lock();
        for entry in data {
            set.insert(Anchor::from(entry.clone()));
        }
        tracing::debug!("restored {} anchors ({} total)", data.len(), set.anchors.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use std::thread;

    fn store() -> AnchorStore {
        AnchorStore::with_clock(Arc::new(ManualClock::new(1_000)))
    }

    #[test]
    fn test_first_request_creates_anchor() {
        let store = store();
        let id = store.anchor_for(Vec3::new(1.0, 0.0, 1.0)).unwrap();
        let anchor = store.get_anchor(id).unwrap();
        assert_eq!(anchor.position, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(anchor.created_at, 1_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reuse_inside_radius() {
        let store = store();
        let a = store.anchor_for(Vec3::ZERO).unwrap();
        let b = store.anchor_for(Vec3::new(1.9, 0.0, 0.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_new_anchor_outside_radius() {
        let store = store();
        let a = store.anchor_for(Vec3::ZERO).unwrap();
        let b = store.anchor_for(Vec3::new(2.1, 0.0, 0.0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_radius_is_exclusive() {
        let store = store();
        let a = store.anchor_for(Vec3::ZERO).unwrap();
        let b = store.anchor_for(Vec3::new(0.0, 0.0, 2.0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reuse_does_not_move_anchor() {
        let store = store();
        let a = store.anchor_for(Vec3::ZERO).unwrap();
        store.anchor_for(Vec3::new(0.5, 0.5, 0.5)).unwrap();
        assert_eq!(store.get_anchor(a).unwrap().position, Vec3::ZERO);
    }

    #[test]
    fn test_nearest_anchor_wins() {
        let store = store();
        let left = store.anchor_for(Vec3::new(-1.5, 0.0, 0.0)).unwrap();
        let right = store.anchor_for(Vec3::new(1.5, 0.0, 0.0)).unwrap();
        assert_ne!(left, right);

        assert_eq!(store.anchor_for(Vec3::new(0.2, 0.0, 0.0)).unwrap(), right);
        assert_eq!(store.anchor_for(Vec3::new(-0.2, 0.0, 0.0)).unwrap(), left);
    }

    #[test]
    fn test_equidistant_tie_goes_to_older_anchor() {
        let clock = Arc::new(ManualClock::new(0));
        let store = AnchorStore::with_clock(clock.clone());
        let older = store.anchor_for(Vec3::new(-1.5, 0.0, 0.0)).unwrap();
        clock.advance(10);
        let newer = store.anchor_for(Vec3::new(1.5, 0.0, 0.0)).unwrap();
        assert_ne!(older, newer);
        assert_eq!(store.anchor_for(Vec3::ZERO).unwrap(), older);
    }

    #[test]
    fn test_reuse_across_grid_cell_boundary() {
        let store = store();
        // 1.99 and 2.01 fall in different cells but are 0.02m apart
        let a = store.anchor_for(Vec3::new(1.99, -0.01, 3.99)).unwrap();
        let b = store.anchor_for(Vec3::new(2.01, 0.01, 4.01)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_negative_coordinates() {
        let store = store();
        let a = store.anchor_for(Vec3::new(-10.0, -3.0, -7.0)).unwrap();
        let b = store.anchor_for(Vec3::new(-11.5, -3.0, -7.0)).unwrap();
        let c = store.anchor_for(Vec3::new(-12.5, -3.0, -7.0)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_non_finite_position_is_refused() {
        let store = store();
        assert!(store.anchor_for(Vec3::new(f64::NAN, 0.0, 0.0)).is_none());
        assert!(store.anchor_for(Vec3::new(f64::NAN, 0.0, 0.0)).is_none());
        assert!(store.resolve(Vec3::new(0.0, f64::INFINITY, 0.0)).is_none());
        assert!(store.is_empty());

        // A finite request near the origin is unaffected
        let a = store.anchor_for(Vec3::ZERO).unwrap();
        assert_eq!(store.resolve(Vec3::new(0.5, 0.0, 0.0)), Some((a, true)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let store = store();
        store.anchor_for(Vec3::ZERO).unwrap();
        assert!(!store.remove_anchor(AnchorId::new()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_removed_anchor_is_absent_and_not_reused() {
        let store = store();
        let a = store.anchor_for(Vec3::ZERO).unwrap();
        assert!(store.remove_anchor(a));
        assert!(store.get_anchor(a).is_none());
        let b = store.anchor_for(Vec3::ZERO).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_clear_all() {
        let store = store();
        store.anchor_for(Vec3::ZERO).unwrap();
        store.anchor_for(Vec3::new(10.0, 0.0, 0.0)).unwrap();
        store.clear_all_anchors();
        assert!(store.is_empty());
        assert!(store.all_anchors().is_empty());
    }

    #[test]
    fn test_anchor_data_roundtrip_preserves_ids() {
        let src = store();
        for i in 0..5 {
            src.anchor_for(Vec3::new(i as f64 * 3.0, 0.1, -0.3)).unwrap();
        }
        let data = src.anchor_data();

        let dst = store();
        dst.restore_from_anchor_data(&data);
        assert_eq!(dst.len(), src.len());
        for (a, b) in src.all_anchors().iter().zip(dst.all_anchors().iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.position.x.to_bits(), b.position.x.to_bits());
            assert_eq!(a.position.y.to_bits(), b.position.y.to_bits());
            assert_eq!(a.position.z.to_bits(), b.position.z.to_bits());
            assert_eq!(a.created_at, b.created_at);
        }
    }

    #[test]
    fn test_restore_augments_and_replaces() {
        let store = store();
        let existing = store.anchor_for(Vec3::ZERO).unwrap();

        let replaced = AnchorData {
            id: existing,
            position: Vec3::new(50.0, 0.0, 0.0),
            timestamp: 7,
        };
        let added = AnchorData {
            id: AnchorId::new(),
            position: Vec3::new(-50.0, 0.0, 0.0),
            timestamp: 8,
        };
        store.restore_from_anchor_data(&[replaced, added.clone()]);

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get_anchor(existing).unwrap().position,
            Vec3::new(50.0, 0.0, 0.0)
        );
        // Grid follows the replacement
        assert_eq!(store.anchor_for(Vec3::new(50.5, 0.0, 0.0)).unwrap(), existing);
        assert_ne!(store.anchor_for(Vec3::ZERO).unwrap(), existing);
        assert_eq!(store.anchor_for(Vec3::new(-49.0, 0.0, 0.0)).unwrap(), added.id);
    }

    #[test]
    fn test_restored_anchors_participate_in_reuse() {
        let store = store();
        let data = AnchorData {
            id: AnchorId::new(),
            position: Vec3::new(3.0, 1.0, 3.0),
            timestamp: 42,
        };
        store.restore_from_anchor_data(std::slice::from_ref(&data));
        assert_eq!(store.anchor_for(Vec3::new(3.5, 1.0, 3.0)).unwrap(), data.id);
    }

    #[test]
    fn test_nearest_anchor_query_does_not_create() {
        let store = store();
        assert!(store.nearest_anchor(Vec3::ZERO, 100.0).is_none());
        let a = store.anchor_for(Vec3::new(5.0, 0.0, 0.0)).unwrap();
        let (found, d) = store.nearest_anchor(Vec3::ZERO, 5.0).unwrap();
        assert_eq!(found.id, a);
        assert!((d - 5.0).abs() < 1e-12);
        assert!(store.nearest_anchor(Vec3::ZERO, 4.9).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_all_anchors_sorted_by_creation() {
        let clock = Arc::new(ManualClock::new(0));
        let store = AnchorStore::with_clock(clock.clone());
        let mut ids = Vec::new();
        for i in 0..4 {
            clock.advance(5);
            ids.push(store.anchor_for(Vec3::new(0.0, 0.0, i as f64 * 10.0)).unwrap());
        }
        let listed: Vec<AnchorId> = store.all_anchors().iter().map(|a| a.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_concurrent_requests_share_one_anchor() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&store);
                thread::spawn(move || s.anchor_for(Vec3::new(i as f64 * 0.01, 0.0, 0.0)).unwrap())
            })
            .collect();
        let ids: HashSet<AnchorId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_anchor_id_parse_display() {
        let id = AnchorId::new();
        assert_eq!(AnchorId::parse(&id.to_string()).unwrap(), id);
        assert!(AnchorId::parse("not-a-uuid").is_err());
    }
}
