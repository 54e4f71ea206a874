use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ENTITY_RADIUS, DEFAULT_MAX_VISIBLE_DISTANCE, DEFAULT_ORIENTATION_SMOOTHING,
    DEFAULT_UPDATE_INTERVAL,
};

/// Tuning for [`AnnotationScene`](crate::AnnotationScene).
///
/// Deserializes with per-field defaults so a config file may set any subset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Minimum seconds between recomputations in `update`.
    pub update_interval: f64,
    /// Picking sphere radius per entity, meters.
    pub entity_radius: f64,
    /// Entities beyond this distance from the camera are hidden, meters.
    pub max_visible_distance: f64,
    /// Fraction of the remaining turn towards the camera applied per update.
    /// 1.0 snaps, 0.0 freezes orientation.
    pub orientation_smoothing: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            entity_radius: DEFAULT_ENTITY_RADIUS,
            max_visible_distance: DEFAULT_MAX_VISIBLE_DISTANCE,
            orientation_smoothing: DEFAULT_ORIENTATION_SMOOTHING,
        }
    }
}

impl SceneConfig {
    /// Copy with out-of-range values pulled back to something usable.
    pub fn sanitized(&self) -> Self {
        let or_default = |v: f64, min: f64, fallback: f64| {
            if v.is_finite() && v >= min { v } else { fallback }
        };
        Self {
            update_interval: or_default(self.update_interval, 0.0, DEFAULT_UPDATE_INTERVAL),
            entity_radius: or_default(self.entity_radius, 0.0, DEFAULT_ENTITY_RADIUS),
            max_visible_distance: or_default(
                self.max_visible_distance,
                0.0,
                DEFAULT_MAX_VISIBLE_DISTANCE,
            ),
            orientation_smoothing: if self.orientation_smoothing.is_finite() {
                self.orientation_smoothing.clamp(0.0, 1.0)
            } else {
                DEFAULT_ORIENTATION_SMOOTHING
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: SceneConfig = serde_json::from_str(r#"{"entity_radius": 0.5}"#).unwrap();
        assert_eq!(cfg.entity_radius, 0.5);
        assert_eq!(cfg.update_interval, DEFAULT_UPDATE_INTERVAL);
    }

    #[test]
    fn test_sanitize() {
        let cfg = SceneConfig {
            update_interval: -1.0,
            entity_radius: f64::NAN,
            max_visible_distance: 5.0,
            orientation_smoothing: 3.0,
        }
        .sanitized();
        assert_eq!(cfg.update_interval, DEFAULT_UPDATE_INTERVAL);
        assert_eq!(cfg.entity_radius, DEFAULT_ENTITY_RADIUS);
        assert_eq!(cfg.max_visible_distance, 5.0);
        assert_eq!(cfg.orientation_smoothing, 1.0);
    }
}
