use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anchor::AnchorId;
use crate::time::Timestamp;
use crate::vector::Vec3;

/// Kind of content an annotation carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    #[default]
    Text,
    Photo,
    Voice,
    Drawing,
    Link,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Voice => "voice",
            Self::Drawing => "drawing",
            Self::Link => "link",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "photo" => Self::Photo,
            "voice" => Self::Voice,
            "drawing" => Self::Drawing,
            "link" => Self::Link,
            _ => Self::Text,
        }
    }
}

/// A piece of user content placed in the world.
///
/// Owned by the host; the scene only keeps a rendered copy keyed by `id`.
/// `position` seeds the anchor lookup and is the picking center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub annotation_type: AnnotationType,
    pub title: Option<String>,
    pub content_text: Option<String>,
    pub position: Vec3,
    pub layer_id: Uuid,
    pub owner_id: String,
    /// Anchor this annotation was placed against, if known.
    #[serde(default)]
    pub anchor_id: Option<AnchorId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Annotation {
    pub fn new(
        annotation_type: AnnotationType,
        content_text: impl Into<String>,
        position: Vec3,
        layer_id: Uuid,
        owner_id: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            annotation_type,
            title: None,
            content_text: Some(content_text.into()),
            position,
            layer_id,
            owner_id: owner_id.into(),
            anchor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title if set and non-empty, else the first line of the content.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => self
                .content_text
                .as_deref()
                .and_then(|c| c.lines().next())
                .unwrap_or(""),
        }
    }
}

/// Named group of annotations that can be shown or hidden together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub is_visible: bool,
}

impl Layer {
    pub const DEFAULT_NAME: &'static str = "Default";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_visible: true,
        }
    }
}
