//! Spatial anchoring and annotation scene engine for AR annotation.
//!
//! Three components, leaves first: [`SessionController`] tracks the AR
//! session lifecycle, [`AnchorStore`] folds placement requests onto a
//! deduplicated anchor set (2 m reuse radius, nearest wins), and
//! [`AnnotationScene`] keeps one rendered entity per annotation under a
//! host-supplied [`SceneRoot`], updating and picking them per frame.
//!
//! Zero I/O: the host owns rendering, tracking hardware and storage.

pub mod anchor;
pub mod annotation;
pub mod config;
pub mod constants;
pub mod quaternion;
pub mod root;
pub mod scene;
pub mod serde_compat;
pub mod session;
pub mod time;
pub mod vector;

pub use anchor::{Anchor, AnchorData, AnchorId, AnchorStore};
pub use annotation::{Annotation, AnnotationType, Layer};
pub use config::SceneConfig;
pub use constants::{ANCHOR_REUSE_RADIUS, EPSILON};
pub use quaternion::Quaternion;
pub use root::{EntityContent, EntityHandle, MemoryRoot, RootNode, SceneRoot, Transform};
pub use scene::{AnnotationScene, FrameStats, RaycastHit, ReloadSummary, SceneEntity};
pub use serde_compat::{CURRENT_VERSION, export_anchor_data_json, export_json, import_json};
pub use session::{SessionController, TrackingQuality, TrackingState, Transition};
pub use time::{Clock, ManualClock, SystemClock, Timestamp, millis_to_iso8601, now_unix_millis};
pub use vector::{Ray, Vec3};
