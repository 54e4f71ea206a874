//! The host's scene-graph attachment point.
//!
//! The scene never owns renderer objects. It hands out [`EntityHandle`]s and
//! tells the root what to attach, move, restyle or hide; the host maps the
//! handles onto whatever its renderer uses.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotation::{Annotation, AnnotationType};
use crate::quaternion::Quaternion;
use crate::vector::Vec3;

/// Opaque id of a rendered entity. Never reused within one scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityHandle(pub u64);

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// World-space placement of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quaternion,
}

/// What the renderer needs to draw one annotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityContent {
    pub annotation_type: AnnotationType,
    pub title: String,
    pub text: String,
    pub layer_id: Uuid,
}

impl From<&Annotation> for EntityContent {
    fn from(a: &Annotation) -> Self {
        Self {
            annotation_type: a.annotation_type,
            title: a.display_title().to_string(),
            text: a.content_text.clone().unwrap_or_default(),
            layer_id: a.layer_id,
        }
    }
}

/// Host-side scene graph node that annotation entities are parented under.
pub trait SceneRoot {
    fn attach(&mut self, handle: EntityHandle, content: &EntityContent, transform: Transform);
    fn detach(&mut self, handle: EntityHandle);
    fn set_transform(&mut self, handle: EntityHandle, transform: Transform);
    fn set_content(&mut self, handle: EntityHandle, content: &EntityContent);
    fn set_visible(&mut self, handle: EntityHandle, visible: bool);
}

/// One child recorded by [`MemoryRoot`].
#[derive(Clone, Debug, PartialEq)]
pub struct RootNode {
    pub content: EntityContent,
    pub transform: Transform,
    pub visible: bool,
}

/// Scene root that keeps its children in memory.
///
/// Stands in for a renderer in headless hosts and tests. Counts transform
/// writes so callers can see how much work each frame pushed.
#[derive(Debug, Default)]
pub struct MemoryRoot {
    nodes: BTreeMap<EntityHandle, RootNode>,
    transform_writes: usize,
}

impl MemoryRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&RootNode> {
        self.nodes.get(&handle)
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn children(&self) -> impl Iterator<Item = (EntityHandle, &RootNode)> {
        self.nodes.iter().map(|(h, n)| (*h, n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn transform_writes(&self) -> usize {
        self.transform_writes
    }
}

impl SceneRoot for MemoryRoot {
    fn attach(&mut self, handle: EntityHandle, content: &EntityContent, transform: Transform) {
        self.nodes.insert(
            handle,
            RootNode {
                content: content.clone(),
                transform,
                visible: true,
            },
        );
    }

    fn detach(&mut self, handle: EntityHandle) {
        self.nodes.remove(&handle);
    }

    fn set_transform(&mut self, handle: EntityHandle, transform: Transform) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.transform = transform;
            self.transform_writes += 1;
        }
    }

    fn set_content(&mut self, handle: EntityHandle, content: &EntityContent) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.content = content.clone();
        }
    }

    fn set_visible(&mut self, handle: EntityHandle, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.visible = visible;
        }
    }
}
