use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::constants::{EPSILON, SLERP_THRESHOLD};
use crate::vector::Vec3;

/// Unit quaternion describing an entity's orientation.
///
/// Always normalized. q and -q describe the same rotation; the angular
/// distance function handles this via abs(dot).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PartialEq for Quaternion {
    fn eq(&self, other: &Self) -> bool {
        (self.w - other.w).abs() < EPSILON
            && (self.x - other.x).abs() < EPSILON
            && (self.y - other.y).abs() < EPSILON
            && (self.z - other.z).abs() < EPSILON
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a new quaternion, automatically normalized.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }.normalize()
    }

    /// Identity quaternion (1, 0, 0, 0).
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotation of `angle` radians about `axis`. A degenerate axis yields identity.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let Some(axis) = axis.normalized() else {
            return Self::identity();
        };
        let half = angle / 2.0;
        let s = half.sin();
        Self {
            w: half.cos(),
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
        }
        .normalize()
    }

    /// Yaw-only rotation turning local +Z from `from` towards `target`.
    ///
    /// Billboards stay upright, so the vertical component of the offset is
    /// dropped. Returns `None` when the target is straight above/below or
    /// coincident, leaving the caller to keep its previous orientation.
    pub fn facing(from: Vec3, target: Vec3) -> Option<Self> {
        let offset = target - from;
        let flat = Vec3::new(offset.x, 0.0, offset.z);
        let dir = flat.normalized()?;
        let yaw = dir.x.atan2(dir.z);
        Some(Self::from_axis_angle(Vec3::UP, yaw))
    }

    /// Unit-length copy; identity when the magnitude is zero or not finite.
    pub fn normalize(self) -> Self {
        let norm = self.dot(self).sqrt();
        if !norm.is_finite() || norm < EPSILON {
            return Self::identity();
        }
        self.scale(1.0 / norm)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Angle in radians of the rotation taking `self` to `other`. Range: [0, π].
    pub fn angular_distance(self, other: Self) -> f64 {
        let d = self.dot(other).abs().clamp(-1.0, 1.0);
        2.0 * d.acos()
    }

    /// Turn `self` a fraction `t` of the way towards `other` along the
    /// shorter arc. Nearly parallel inputs fall back to normalized lerp.
    pub fn slerp(self, other: Self, t: f64) -> Self {
        if t <= 0.0 {
            return self;
        }
        if t >= 1.0 {
            return other;
        }

        let cos = self.dot(other);
        let (target, cos) = if cos < 0.0 { (-other, -cos) } else { (other, cos) };

        if cos > SLERP_THRESHOLD {
            return Self::blend(self, 1.0 - t, target, t).normalize();
        }

        let angle = cos.min(1.0).acos();
        let sin = angle.sin();
        Self::blend(
            self,
            ((1.0 - t) * angle).sin() / sin,
            target,
            (t * angle).sin() / sin,
        )
        .normalize()
    }

    fn scale(self, k: f64) -> Self {
        Self {
            w: self.w * k,
            x: self.x * k,
            y: self.y * k,
            z: self.z * k,
        }
    }

    /// Weighted sum `a * wa + b * wb`, unnormalized.
    fn blend(a: Self, wa: f64, b: Self, wb: f64) -> Self {
        let (a, b) = (a.scale(wa), b.scale(wb));
        Self {
            w: a.w + b.w,
            x: a.x + b.x,
            y: a.y + b.y,
            z: a.z + b.z,
        }
    }

    /// Rotate a vector by this quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }

    pub fn conjugate(self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl std::ops::Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1.0)
    }
}

/// Hamilton product.
impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, r: Self) -> Self {
        Self {
            w: self.w * r.w - self.x * r.x - self.y * r.y - self.z * r.z,
            x: self.w * r.x + self.x * r.w + self.y * r.z - self.z * r.y,
            y: self.w * r.y - self.x * r.z + self.y * r.w + self.z * r.x,
            z: self.w * r.z + self.x * r.y - self.y * r.x + self.z * r.w,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity_rotates_nothing() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let r = Quaternion::identity().rotate(v);
        assert_relative_eq!(r.x, 1.0);
        assert_relative_eq!(r.y, 2.0);
        assert_relative_eq!(r.z, 3.0);
    }

    #[test]
    fn test_axis_angle_quarter_turn() {
        let q = Quaternion::from_axis_angle(Vec3::UP, FRAC_PI_2);
        let r = q.rotate(Vec3::FORWARD);
        assert_relative_eq!(r.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_axis_is_identity() {
        assert_eq!(
            Quaternion::from_axis_angle(Vec3::ZERO, 1.0),
            Quaternion::identity()
        );
    }

    #[test]
    fn test_facing_points_forward_axis_at_target() {
        let from = Vec3::new(0.0, 1.0, 0.0);
        let target = Vec3::new(-3.0, 1.6, 0.0);
        let q = Quaternion::facing(from, target).unwrap();
        let forward = q.rotate(Vec3::FORWARD);
        assert_relative_eq!(forward.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(forward.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(forward.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_facing_straight_up_is_none() {
        assert!(Quaternion::facing(Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0)).is_none());
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = Quaternion::identity();
        let b = Quaternion::from_axis_angle(Vec3::UP, PI / 2.0);
        assert_eq!(a.slerp(b, 0.0), a);
        assert_eq!(a.slerp(b, 1.0), b);
        let mid = a.slerp(b, 0.5);
        assert_relative_eq!(a.angular_distance(mid), PI / 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_antipodal_equivalence() {
        let q = Quaternion::from_axis_angle(Vec3::UP, 0.7);
        assert!(q.angular_distance(-q) < 1e-6);
    }

    #[test]
    fn test_product_composes_rotations() {
        let a = Quaternion::from_axis_angle(Vec3::UP, 0.3);
        let b = Quaternion::from_axis_angle(Vec3::UP, 0.4);
        let c = Quaternion::from_axis_angle(Vec3::UP, 0.7);
        assert_eq!(a * b, c);
        assert_eq!(a * a.conjugate(), Quaternion::identity());
    }
}
