//! Robot state snapshot published on the status endpoint.

use serde::{Deserialize, Serialize};

use crate::geometry::{Orientation, Pose2D, Twist2D, Vector3D};
use crate::joint::{JointName, NUM_JOINTS};
use crate::schema::WireMessage;
use crate::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub pose: Pose2D,
    pub twist: Twist2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Imu {
    pub orientation: Orientation,
    pub acceleration: Vector3D,
    pub gyro: Vector3D,
}

/// One sample of battery, runstop, odometry, IMU and joint state.
///
/// The three joint vectors are index-aligned with [`JointName::ALL`].  The
/// base entries are always `0.0`: the base has no absolute joint position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub is_charging: bool,
    pub is_low_voltage: bool,
    pub runstop: bool,
    pub odometry: Odometry,
    pub imu: Imu,
    pub joint_positions: Vec<f64>,
    pub joint_velocities: Vec<f64>,
    pub joint_efforts: Vec<f64>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            is_charging: false,
            is_low_voltage: false,
            runstop: false,
            odometry: Odometry::default(),
            imu: Imu::default(),
            joint_positions: vec![0.0; NUM_JOINTS],
            joint_velocities: vec![0.0; NUM_JOINTS],
            joint_efforts: vec![0.0; NUM_JOINTS],
        }
    }
}

impl Status {
    pub fn position(&self, joint: JointName) -> Option<f64> {
        self.joint_positions.get(joint.index()).copied()
    }
}

impl WireMessage for Status {
    const NAME: &'static str = "Status";

    fn validate(&self) -> Result<(), LinkError> {
        for (field, values) in [
            ("joint_positions", &self.joint_positions),
            ("joint_velocities", &self.joint_velocities),
            ("joint_efforts", &self.joint_efforts),
        ] {
            if values.len() != NUM_JOINTS {
                return Err(LinkError::Validation(format!(
                    "{field}: need {NUM_JOINTS} values, received {}",
                    values.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValidationMode;

    fn sample() -> Status {
        Status {
            is_charging: true,
            is_low_voltage: false,
            runstop: true,
            odometry: Odometry {
                pose: Pose2D {
                    x: 1.25,
                    y: -0.5,
                    theta: 0.1 + 0.2,
                },
                twist: Twist2D::new(0.05, -0.01),
            },
            imu: Imu {
                orientation: Orientation {
                    roll: 0.01,
                    pitch: -0.02,
                    yaw: std::f64::consts::PI,
                },
                acceleration: Vector3D::new(0.0, 0.1, 9.81),
                gyro: Vector3D::new(1e-9, -1e-12, 0.0),
            },
            joint_positions: vec![0.0, 0.0, 0.5, 0.3, 0.1, -0.2, 0.0, 0.0, 0.0, 50.0],
            joint_velocities: vec![0.0, 0.0, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            joint_efforts: vec![0.0, 0.0, 12.5, -3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn status_survives_the_wire_exactly() {
        let status = sample();
        let decoded = Status::from_bytes(&status.to_bytes().unwrap(), ValidationMode::Strict)
            .unwrap();
        assert_eq!(decoded, status);
        assert_eq!(
            decoded.odometry.pose.theta.to_bits(),
            status.odometry.pose.theta.to_bits()
        );
        assert_eq!(decoded.position(JointName::Gripper), Some(50.0));
    }

    #[test]
    fn status_with_short_joint_vector_is_invalid() {
        let mut status = sample();
        status.joint_efforts.pop();
        let bytes = status.to_bytes().unwrap();
        let err = Status::from_bytes(&bytes, ValidationMode::Strict).unwrap_err();
        assert!(err.to_string().contains("joint_efforts"));
        assert!(Status::from_bytes(&bytes, ValidationMode::Skip).is_ok());
    }

    #[test]
    fn default_status_reports_zero_base_joints() {
        let status = Status::default();
        assert!(status.validate().is_ok());
        assert_eq!(status.position(JointName::BaseTranslate), Some(0.0));
        assert_eq!(status.position(JointName::BaseRotate), Some(0.0));
    }
}
