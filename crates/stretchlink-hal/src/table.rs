//! Declarative joint table.
//!
//! One row per [`JointName`], in wire order.  The same row tells the driver
//! where a joint's state lives in [`RawStatus`] and which primitive commands
//! it.
//!
//! | Joint | Source |
//! |---|---|
//! | `base_translate`, `base_rotate` | relative: reported as zero, commanded by `translate_by` / `rotate_by` |
//! | everything else | one [`Actuator`], read from its status entry, commanded by `move_to` |

use stretchlink_types::{Imu, JointName, NUM_JOINTS, Odometry, Orientation, Pose2D, Status, Twist2D, Vector3D};

use crate::hardware::{Actuator, JointReading, RawStatus};

/// Where a joint's state comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointSource {
    /// Relative base joint.  No absolute state.
    Relative,
    Actuator(Actuator),
}

pub const JOINT_TABLE: [(JointName, JointSource); NUM_JOINTS] = [
    (JointName::BaseTranslate, JointSource::Relative),
    (JointName::BaseRotate, JointSource::Relative),
    (JointName::Lift, JointSource::Actuator(Actuator::Lift)),
    (JointName::Arm, JointSource::Actuator(Actuator::Arm)),
    (JointName::HeadPan, JointSource::Actuator(Actuator::HeadPan)),
    (JointName::HeadTilt, JointSource::Actuator(Actuator::HeadTilt)),
    (JointName::WristYaw, JointSource::Actuator(Actuator::WristYaw)),
    (JointName::WristPitch, JointSource::Actuator(Actuator::WristPitch)),
    (JointName::WristRoll, JointSource::Actuator(Actuator::WristRoll)),
    (JointName::Gripper, JointSource::Actuator(Actuator::Gripper)),
];

/// Table row for `joint`.
pub fn source(joint: JointName) -> JointSource {
    JOINT_TABLE[joint.index()].1
}

/// Actuator commanded for `joint`, `None` for the relative base joints.
pub fn actuator(joint: JointName) -> Option<Actuator> {
    match source(joint) {
        JointSource::Relative => None,
        JointSource::Actuator(a) => Some(a),
    }
}

/// Reading for `joint`; relative joints always read zero.
pub fn reading(raw: &RawStatus, joint: JointName) -> JointReading {
    match source(joint) {
        JointSource::Relative => JointReading::default(),
        JointSource::Actuator(a) => raw.reading(a),
    }
}

/// Convert a vendor status map into the wire [`Status`].
pub fn status_from_raw(raw: &RawStatus) -> Status {
    let readings: Vec<JointReading> = JOINT_TABLE
        .iter()
        .map(|(joint, _)| reading(raw, *joint))
        .collect();
    let imu = &raw.pimu.imu;

    Status {
        is_charging: raw.pimu.charger_is_charging,
        is_low_voltage: raw.pimu.low_voltage_alert,
        runstop: raw.pimu.runstop_event,
        odometry: Odometry {
            pose: Pose2D {
                x: raw.base.x,
                y: raw.base.y,
                theta: raw.base.theta,
            },
            twist: Twist2D::new(raw.base.x_vel, raw.base.theta_vel),
        },
        imu: Imu {
            orientation: Orientation {
                roll: imu.roll,
                pitch: imu.pitch,
                yaw: imu.heading,
            },
            acceleration: Vector3D::new(imu.ax, imu.ay, imu.az),
            gyro: Vector3D::new(imu.gx, imu.gy, imu.gz),
        },
        joint_positions: readings.iter().map(|r| r.pos).collect(),
        joint_velocities: readings.iter().map(|r| r.vel).collect(),
        joint_efforts: readings.iter().map(|r| r.effort).collect(),
    }
}
