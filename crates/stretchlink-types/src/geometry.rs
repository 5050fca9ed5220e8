//! Plain geometric value types used inside the message schemas.
//!
//! Every field has a default so partially specified maps from a client
//! decode the same way the reference Python models do.

use serde::{Deserialize, Serialize};

use crate::schema::WireMessage;

/// A 3-D vector (metres, m/s², rad/s depending on context).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A quaternion in `(x, y, z, w)` order.  Defaults to the identity rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector4D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Vector4D {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }
}

impl Default for Vector4D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Euler orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Planar pose: metres and radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Planar twist.  Also the request body of the `goto` RPC, where the two
/// fields are a distance (m) and an angle (rad) to move by.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Twist2D {
    pub linear: f64,
    pub angular: f64,
}

impl Twist2D {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// `true` when both axes are non-zero.  The base executes one motion
    /// primitive at a time, so such a twist is never sent to the hardware.
    pub fn is_compound(&self) -> bool {
        self.linear != 0.0 && self.angular != 0.0
    }
}

impl WireMessage for Twist2D {
    const NAME: &'static str = "Twist2D";
}

/// Position plus quaternion orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose3D {
    pub position: Vector3D,
    pub orientation: Vector4D,
}

impl Pose3D {
    pub fn new(position: Vector3D, orientation: Vector4D) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValidationMode;

    #[test]
    fn twist_compound_only_when_both_axes_move() {
        assert!(Twist2D::new(0.5, 0.3).is_compound());
        assert!(!Twist2D::new(0.5, 0.0).is_compound());
        assert!(!Twist2D::new(0.0, -0.3).is_compound());
        assert!(!Twist2D::default().is_compound());
    }

    #[test]
    fn quaternion_defaults_to_identity() {
        let q = Vector4D::default();
        assert_eq!(q, Vector4D::new(0.0, 0.0, 0.0, 1.0));
        assert!((q.norm() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pose3d_fills_missing_fields_with_defaults() {
        let bytes = rmp_serde::to_vec_named(&serde_json::json!({
            "position": { "x": 0.1 }
        }))
        .unwrap();
        let pose: Pose3D = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(pose.position, Vector3D::new(0.1, 0.0, 0.0));
        assert_eq!(pose.orientation, Vector4D::identity());
    }

    #[test]
    fn twist_decodes_integer_fields() {
        let bytes = rmp_serde::to_vec_named(&serde_json::json!({ "linear": 1, "angular": 0 }))
            .unwrap();
        let twist = Twist2D::from_bytes(&bytes, ValidationMode::Strict).unwrap();
        assert_eq!(twist, Twist2D::new(1.0, 0.0));
    }
}
