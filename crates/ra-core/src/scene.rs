//! Live rendered representation of annotations.
//!
//! The scene maps each annotation id to exactly one entity beneath the host's
//! [`SceneRoot`], keeps the entities turned towards the camera, culls distant
//! or hidden ones, and answers closest-hit ray queries. Missing ids are never
//! errors: lookups come back empty and removals do nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::anchor::{AnchorId, AnchorStore};
use crate::annotation::Annotation;
use crate::config::SceneConfig;
use crate::constants::EPSILON;
use crate::quaternion::Quaternion;
use crate::root::{EntityContent, EntityHandle, SceneRoot, Transform};
use crate::vector::{Ray, Vec3};

/// Orientation changes smaller than this (radians) are not pushed to the root.
const ORIENTATION_PUSH_THRESHOLD: f64 = 1e-4;

/// A rendered annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneEntity {
    pub handle: EntityHandle,
    pub annotation_id: Uuid,
    /// `None` only when the annotation's position could not be anchored.
    pub anchor_id: Option<AnchorId>,
    /// Entity position relative to its anchor.
    pub anchor_offset: Vec3,
    pub position: Vec3,
    pub orientation: Quaternion,
    pub content: EntityContent,
    /// Visibility last pushed to the root.
    pub visible: bool,
}

impl SceneEntity {
    fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            orientation: self.orientation,
        }
    }
}

/// Counts from one `reload_annotations` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// What one `update` call did. Counts are only filled on frames that ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub ran: bool,
    pub visible: usize,
    pub hidden: usize,
}

/// Closest intersection found by [`AnnotationScene::pick`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastHit {
    pub handle: EntityHandle,
    pub annotation_id: Uuid,
    /// Distance from the ray origin to the hit, meters.
    pub distance: f64,
    pub point: Vec3,
}

/// Owns the mapping annotation id → entity.
///
/// Driven from a single render thread; `update` does no I/O and takes no
/// locks beyond the anchor store's short critical sections at creation time.
pub struct AnnotationScene<R: SceneRoot> {
    anchors: Arc<AnchorStore>,
    root: Option<R>,
    config: SceneConfig,
    entities: HashMap<Uuid, SceneEntity>,
    hidden_layers: HashSet<Uuid>,
    next_handle: u64,
    pending_time: f64,
    last_camera: Option<Vec3>,
}

impl<R: SceneRoot> AnnotationScene<R> {
    pub fn new(anchors: Arc<AnchorStore>) -> Self {
        Self::with_config(anchors, SceneConfig::default())
    }

    pub fn with_config(anchors: Arc<AnchorStore>, config: SceneConfig) -> Self {
        Self {
            anchors,
            root: None,
            config: config.sanitized(),
            entities: HashMap::new(),
            hidden_layers: HashSet::new(),
            next_handle: 1,
            pending_time: 0.0,
            last_camera: None,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn anchors(&self) -> &Arc<AnchorStore> {
        &self.anchors
    }

    pub fn root(&self) -> Option<&R> {
        self.root.as_ref()
    }

    /// Set or replace the scene root. Live entities move under the new root;
    /// the previous root, emptied of them, is handed back.
    pub fn set_root_entity(&mut self, mut root: R) -> Option<R> {
        let mut previous = self.root.take();
        for entity in self.entities.values() {
            if let Some(old) = previous.as_mut() {
                old.detach(entity.handle);
            }
            attach(&mut root, entity);
        }
        tracing::debug!("scene root set, {} entities attached", self.entities.len());
        self.root = Some(root);
        previous
    }

    /// Create the entity for `annotation`, or refresh it if one exists.
    pub fn create_entity(&mut self, annotation: &Annotation) -> EntityHandle {
        if let Some(handle) = self.get_entity(annotation.id) {
            self.update_entity(annotation);
            return handle;
        }

        let (anchor_id, anchor_offset) = bind_anchor(&self.anchors, annotation);
        let handle = EntityHandle(self.next_handle);
        self.next_handle += 1;

        let content = EntityContent::from(annotation);
        let orientation = self
            .last_camera
            .and_then(|camera| Quaternion::facing(annotation.position, camera))
            .unwrap_or_default();
        let visible = self.should_show(&content, annotation.position);

        let entity = SceneEntity {
            handle,
            annotation_id: annotation.id,
            anchor_id,
            anchor_offset,
            position: annotation.position,
            orientation,
            content,
            visible,
        };

        if let Some(root) = self.root.as_mut() {
            attach(root, &entity);
        }
        tracing::debug!("created {handle} for annotation {}", annotation.id);
        self.entities.insert(annotation.id, entity);
        handle
    }

    pub fn get_entity(&self, annotation_id: Uuid) -> Option<EntityHandle> {
        self.entities.get(&annotation_id).map(|e| e.handle)
    }

    pub fn entity(&self, annotation_id: Uuid) -> Option<&SceneEntity> {
        self.entities.get(&annotation_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &SceneEntity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Detach and forget the entity for `annotation_id`. Returns whether one existed.
    pub fn remove_entity(&mut self, annotation_id: Uuid) -> bool {
        let Some(entity) = self.entities.remove(&annotation_id) else {
            return false;
        };
        if let Some(root) = self.root.as_mut() {
            root.detach(entity.handle);
        }
        tracing::debug!("removed {} for annotation {annotation_id}", entity.handle);
        true
    }

    /// Refresh an existing entity from the annotation's current fields.
    /// Never creates. Returns whether anything changed.
    pub fn update_entity(&mut self, annotation: &Annotation) -> bool {
        let Some(entity) = self.entities.get(&annotation.id) else {
            return false;
        };
        let content = EntityContent::from(annotation);
        let content_changed = content != entity.content;
        let moved = entity.position.distance(annotation.position) > EPSILON;
        if !content_changed && !moved {
            return false;
        }
        let visible = self.should_show(&content, annotation.position);
        let rebound = moved.then(|| bind_anchor(&self.anchors, annotation));

        let Some(entity) = self.entities.get_mut(&annotation.id) else {
            return false;
        };
        if content_changed {
            entity.content = content;
            if let Some(root) = self.root.as_mut() {
                root.set_content(entity.handle, &entity.content);
            }
        }
        if let Some((anchor_id, anchor_offset)) = rebound {
            entity.anchor_id = anchor_id;
            entity.anchor_offset = anchor_offset;
            entity.position = annotation.position;
            if let Some(root) = self.root.as_mut() {
                root.set_transform(entity.handle, entity.transform());
            }
        }
        if visible != entity.visible {
            entity.visible = visible;
            if let Some(root) = self.root.as_mut() {
                root.set_visible(entity.handle, visible);
            }
        }
        tracing::trace!("updated {} for annotation {}", entity.handle, annotation.id);
        true
    }

    /// Sync the live set to exactly `annotations`: create new ids, refresh
    /// changed ones, remove everything not listed.
    pub fn reload_annotations(&mut self, annotations: &[Annotation]) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        let wanted: HashSet<Uuid> = annotations.iter().map(|a| a.id).collect();

        let stale: Vec<Uuid> = self
            .entities
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        for id in stale {
            if self.remove_entity(id) {
                summary.removed += 1;
            }
        }

        for annotation in annotations {
            if self.entities.contains_key(&annotation.id) {
                if self.update_entity(annotation) {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            } else {
                self.create_entity(annotation);
                summary.created += 1;
            }
        }

        tracing::debug!(
            "reloaded annotations: created={} updated={} removed={} unchanged={}",
            summary.created,
            summary.updated,
            summary.removed,
            summary.unchanged
        );
        summary
    }

    /// Per-frame tick. Recomputes visibility and camera-facing orientation at
    /// most once per `update_interval`; calls in between only accumulate time.
    pub fn update(&mut self, camera_position: Vec3, delta_time: f64) -> FrameStats {
        if self.entities.is_empty() || !camera_position.is_finite() {
            return FrameStats::default();
        }
        if delta_time.is_finite() && delta_time > 0.0 {
            self.pending_time += delta_time;
        }
        let first_frame = self.last_camera.is_none();
        if !first_frame && self.pending_time < self.config.update_interval {
            return FrameStats::default();
        }
        self.pending_time = 0.0;
        self.last_camera = Some(camera_position);

        let mut stats = FrameStats {
            ran: true,
            ..FrameStats::default()
        };
        let smoothing = self.config.orientation_smoothing;
        let max_distance = self.config.max_visible_distance;

        for entity in self.entities.values_mut() {
            let visible = !self.hidden_layers.contains(&entity.content.layer_id)
                && entity.position.distance(camera_position) <= max_distance;
            if visible != entity.visible {
                entity.visible = visible;
                if let Some(root) = self.root.as_mut() {
                    root.set_visible(entity.handle, visible);
                }
            }
            if !visible {
                stats.hidden += 1;
                continue;
            }
            stats.visible += 1;

            let Some(target) = Quaternion::facing(entity.position, camera_position) else {
                continue;
            };
            let next = if first_frame {
                target
            } else {
                entity.orientation.slerp(target, smoothing)
            };
            if next.angular_distance(entity.orientation) > ORIENTATION_PUSH_THRESHOLD {
                entity.orientation = next;
                if let Some(root) = self.root.as_mut() {
                    root.set_transform(entity.handle, entity.transform());
                }
            }
        }
        stats
    }

    /// Handle of the visible entity nearest along the ray, if any is hit.
    pub fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<EntityHandle> {
        self.pick(origin, direction).map(|hit| hit.handle)
    }

    /// Closest-hit ray query against each visible entity's bounding sphere.
    /// Ties go to the smaller handle so results are deterministic.
    pub fn pick(&self, origin: Vec3, direction: Vec3) -> Option<RaycastHit> {
        let ray = Ray::new(origin, direction)?;
        let radius = self.config.entity_radius;

        self.entities
            .values()
            .filter(|e| e.visible)
            .filter_map(|e| {
                ray.intersect_sphere(e.position, radius)
                    .map(|t| (t, e.handle, e.annotation_id))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(distance, handle, annotation_id)| RaycastHit {
                handle,
                annotation_id,
                distance,
                point: ray.point_at(distance),
            })
    }

    /// Remove every entity.
    pub fn clear_all(&mut self) {
        if let Some(root) = self.root.as_mut() {
            for entity in self.entities.values() {
                root.detach(entity.handle);
            }
        }
        tracing::debug!("cleared {} entities", self.entities.len());
        self.entities.clear();
    }

    /// Show or hide every entity on `layer_id`. Hidden entities cannot be picked.
    pub fn set_layer_visible(&mut self, layer_id: Uuid, visible: bool) {
        if visible {
            self.hidden_layers.remove(&layer_id);
        } else {
            self.hidden_layers.insert(layer_id);
        }

        let ids: Vec<Uuid> = self
            .entities
            .values()
            .filter(|e| e.content.layer_id == layer_id)
            .map(|e| e.annotation_id)
            .collect();
        for id in ids {
            let show = {
                let e = &self.entities[&id];
                self.should_show(&e.content, e.position)
            };
            if let Some(entity) = self.entities.get_mut(&id)
                && entity.visible != show
            {
                entity.visible = show;
                if let Some(root) = self.root.as_mut() {
                    root.set_visible(entity.handle, show);
                }
            }
        }
    }

    pub fn is_layer_visible(&self, layer_id: Uuid) -> bool {
        !self.hidden_layers.contains(&layer_id)
    }

    /// Annotations whose anchor is no longer in the store, or that never got
    /// one, sorted. The scene keeps rendering them at their last position;
    /// the host decides whether to re-anchor or drop them.
    pub fn dangling_anchors(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .entities
            .values()
            .filter(|e| !e.anchor_id.is_some_and(|id| self.anchors.contains(id)))
            .map(|e| e.annotation_id)
            .collect();
        ids.sort();
        ids
    }

    fn should_show(&self, content: &EntityContent, position: Vec3) -> bool {
        !self.hidden_layers.contains(&content.layer_id)
            && self
                .last_camera
                .is_none_or(|camera| position.distance(camera) <= self.config.max_visible_distance)
    }
}

fn attach<R: SceneRoot>(root: &mut R, entity: &SceneEntity) {
    root.attach(entity.handle, &entity.content, entity.transform());
    if !entity.visible {
        root.set_visible(entity.handle, false);
    }
}

/// Anchor for an annotation: its recorded anchor if it has one, otherwise
/// whatever the store resolves for its position.
///
/// A recorded anchor missing from the store is kept as is and surfaces
/// through [`AnnotationScene::dangling_anchors`].
fn bind_anchor(anchors: &AnchorStore, annotation: &Annotation) -> (Option<AnchorId>, Vec3) {
    let Some(id) = annotation
        .anchor_id
        .or_else(|| anchors.anchor_for(annotation.position))
    else {
        return (None, Vec3::ZERO);
    };
    let offset = anchors
        .get_anchor(id)
        .map(|anchor| annotation.position - anchor.position)
        .unwrap_or(Vec3::ZERO);
    (Some(id), offset)
}
