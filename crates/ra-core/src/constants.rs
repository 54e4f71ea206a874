/// Placement requests closer than this (meters) reuse an existing anchor.
/// Exclusive: a point exactly at the radius gets a new anchor.
pub const ANCHOR_REUSE_RADIUS: f64 = 2.0;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// SLERP near-parallel threshold
pub const SLERP_THRESHOLD: f64 = 0.9995;

/// Minimum time between scene recomputations (seconds, ~30 Hz)
pub const DEFAULT_UPDATE_INTERVAL: f64 = 1.0 / 30.0;

/// Bounding sphere radius used for picking (meters)
pub const DEFAULT_ENTITY_RADIUS: f64 = 0.15;

/// Entities farther than this from the camera are hidden (meters)
pub const DEFAULT_MAX_VISIBLE_DISTANCE: f64 = 20.0;

/// Fraction of the remaining rotation applied per scene update
pub const DEFAULT_ORIENTATION_SMOOTHING: f64 = 0.35;
