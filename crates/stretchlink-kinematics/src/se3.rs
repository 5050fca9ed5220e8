//! SE(3) helpers on top of `nalgebra`.

use nalgebra::{Isometry3, Matrix3, Quaternion, Translation3, UnitQuaternion, Vector3, Vector6};
use stretchlink_types::{LinkError, Pose3D};

/// Below this rotation angle the series expansion of `V⁻¹` is used.
const SMALL_ANGLE: f64 = 1e-6;

/// Logarithm of a rigid transform as a twist `[v; ω]` (linear first).
pub fn log6(m: &Isometry3<f64>) -> Vector6<f64> {
    let w = m.rotation.scaled_axis();
    let theta = w.norm();
    let p = m.translation.vector;
    let wx = w.cross_matrix();

    let coeff = if theta < SMALL_ANGLE {
        1.0 / 12.0
    } else {
        let half = 0.5 * theta;
        (1.0 - half * half.cos() / half.sin()) / (theta * theta)
    };
    let v_inv = Matrix3::identity() - 0.5 * wx + coeff * wx * wx;
    let v = v_inv * p;

    Vector6::new(v.x, v.y, v.z, w.x, w.y, w.z)
}

/// Rigid transform from a translation and a fixed-axis roll/pitch/yaw.
pub fn from_xyz_rpy(xyz: [f64; 3], rpy: [f64; 3]) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// Relative transform described by a wire pose: position delta plus an
/// orientation quaternion, normalised here.
///
/// # Errors
///
/// [`LinkError::Validation`] for a zero or non-finite quaternion.
pub fn from_pose(pose: &Pose3D) -> Result<Isometry3<f64>, LinkError> {
    let o = &pose.orientation;
    let q = Quaternion::new(o.w, o.x, o.y, o.z);
    let norm = q.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return Err(LinkError::Validation(format!(
            "orientation quaternion cannot be normalised (norm {norm})"
        )));
    }
    let p = &pose.position;
    Ok(Isometry3::from_parts(
        Translation3::from(Vector3::new(p.x, p.y, p.z)),
        UnitQuaternion::from_quaternion(q),
    ))
}
