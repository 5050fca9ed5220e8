//! [`RobotHardware`] – the single hardware-control handle of the robot.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stretchlink_types::LinkError;

/// How often [`RobotHardware::wait_command`] polls for completion.
pub const MOTION_POLL_PERIOD: Duration = Duration::from_millis(10);

/// Absolutely positioned actuators reachable through
/// [`RobotHardware::move_to`].  The base is commanded separately through
/// [`RobotHardware::translate_by`] / [`RobotHardware::rotate_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    Lift,
    Arm,
    HeadPan,
    HeadTilt,
    WristYaw,
    WristPitch,
    WristRoll,
    Gripper,
}

impl Actuator {
    /// Name of the actuator in the vendor status map.
    pub fn vendor_name(self) -> &'static str {
        match self {
            Actuator::Lift => "lift",
            Actuator::Arm => "arm",
            Actuator::HeadPan => "head_pan",
            Actuator::HeadTilt => "head_tilt",
            Actuator::WristYaw => "wrist_yaw",
            Actuator::WristPitch => "wrist_pitch",
            Actuator::WristRoll => "wrist_roll",
            Actuator::Gripper => "stretch_gripper",
        }
    }
}

/// The robot's hardware-control handle.
///
/// Motion setters only queue a target; nothing moves until
/// [`push_command`][Self::push_command].  Implementations are not required
/// to be reentrant: callers serialize access (the driver keeps the handle
/// behind one mutex).
pub trait RobotHardware: Send {
    /// Connect to the robot.  Returns `false` when it is unreachable.
    fn startup(&mut self) -> bool;

    fn is_homed(&self) -> bool;

    /// Run the homing routine.  Blocks until it finishes.
    fn home(&mut self) -> Result<(), LinkError>;

    /// Refresh and return the vendor status map.
    fn pull_status(&mut self) -> Result<RawStatus, LinkError>;

    /// Queue a relative base translation in metres.
    fn translate_by(&mut self, metres: f64) -> Result<(), LinkError>;

    /// Queue a relative base rotation in radians.
    fn rotate_by(&mut self, radians: f64) -> Result<(), LinkError>;

    /// Queue an absolute target for `actuator` in its native unit.
    fn move_to(&mut self, actuator: Actuator, value: f64) -> Result<(), LinkError>;

    /// Send every queued target to the hardware.
    fn push_command(&mut self) -> Result<(), LinkError>;

    /// `true` while pushed motion is still being executed.  Must not block.
    fn is_moving(&mut self) -> Result<bool, LinkError>;

    /// Block until the pushed motion completes.
    ///
    /// Holds `self` for the whole motion.  Callers sharing the handle
    /// should poll [`is_moving`][Self::is_moving] instead.
    fn wait_command(&mut self) -> Result<(), LinkError> {
        while self.is_moving()? {
            std::thread::sleep(MOTION_POLL_PERIOD);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LinkError>;

    fn shutdown(&mut self) -> Result<(), LinkError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Vendor status map
// ────────────────────────────────────────────────────────────────────────────
//
// Field names follow the vendor map exactly so a real backend can
// deserialize it directly.  Unknown keys are ignored and missing keys
// default to zero.

/// Full vendor status map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStatus {
    pub pimu: PimuStatus,
    pub base: BaseStatus,
    pub lift: LinearJointStatus,
    pub arm: LinearJointStatus,
    pub head: HeadStatus,
    pub end_of_arm: EndOfArmStatus,
}

/// Power and IMU board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PimuStatus {
    pub charger_is_charging: bool,
    pub low_voltage_alert: bool,
    pub runstop_event: bool,
    pub imu: ImuStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuStatus {
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

/// Base odometry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseStatus {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub x_vel: f64,
    pub theta_vel: f64,
}

/// Lift and arm report effort as `force`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearJointStatus {
    pub pos: f64,
    pub vel: f64,
    pub force: f64,
}

/// Dynamixel joints report effort as `effort`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoJointStatus {
    pub pos: f64,
    pub vel: f64,
    pub effort: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadStatus {
    pub head_pan: ServoJointStatus,
    pub head_tilt: ServoJointStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndOfArmStatus {
    pub wrist_yaw: ServoJointStatus,
    pub wrist_pitch: ServoJointStatus,
    pub wrist_roll: ServoJointStatus,
    pub stretch_gripper: ServoJointStatus,
}

/// Position, velocity and effort of one joint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointReading {
    pub pos: f64,
    pub vel: f64,
    pub effort: f64,
}

impl From<&LinearJointStatus> for JointReading {
    fn from(s: &LinearJointStatus) -> Self {
        Self {
            pos: s.pos,
            vel: s.vel,
            effort: s.force,
        }
    }
}

impl From<&ServoJointStatus> for JointReading {
    fn from(s: &ServoJointStatus) -> Self {
        Self {
            pos: s.pos,
            vel: s.vel,
            effort: s.effort,
        }
    }
}

impl RawStatus {
    /// State of `actuator` as reported in this map.
    pub fn reading(&self, actuator: Actuator) -> JointReading {
        match actuator {
            Actuator::Lift => (&self.lift).into(),
            Actuator::Arm => (&self.arm).into(),
            Actuator::HeadPan => (&self.head.head_pan).into(),
            Actuator::HeadTilt => (&self.head.head_tilt).into(),
            Actuator::WristYaw => (&self.end_of_arm.wrist_yaw).into(),
            Actuator::WristPitch => (&self.end_of_arm.wrist_pitch).into(),
            Actuator::WristRoll => (&self.end_of_arm.wrist_roll).into(),
            Actuator::Gripper => (&self.end_of_arm.stretch_gripper).into(),
        }
    }

    /// Position of `actuator`.
    pub fn position(&self, actuator: Actuator) -> f64 {
        self.reading(actuator).pos
    }

    /// Mutable position of `actuator`, used by simulated backends.
    pub fn position_mut(&mut self, actuator: Actuator) -> &mut f64 {
        match actuator {
            Actuator::Lift => &mut self.lift.pos,
            Actuator::Arm => &mut self.arm.pos,
            Actuator::HeadPan => &mut self.head.head_pan.pos,
            Actuator::HeadTilt => &mut self.head.head_tilt.pos,
            Actuator::WristYaw => &mut self.end_of_arm.wrist_yaw.pos,
            Actuator::WristPitch => &mut self.end_of_arm.wrist_pitch.pos,
            Actuator::WristRoll => &mut self.end_of_arm.wrist_roll.pos,
            Actuator::Gripper => &mut self.end_of_arm.stretch_gripper.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_status_deserializes_from_partial_vendor_map() {
        let json = serde_json::json!({
            "pimu": {
                "charger_is_charging": true,
                "runstop_event": false,
                "voltage": 12.1,
                "imu": { "roll": 0.1, "heading": 1.5, "az": 9.8 }
            },
            "lift": { "pos": 0.5, "vel": 0.0, "force": 12.0, "motor": {} },
            "end_of_arm": { "stretch_gripper": { "pos": 40.0, "effort": 3.0 } }
        });
        let raw: RawStatus = serde_json::from_value(json).unwrap();
        assert!(raw.pimu.charger_is_charging);
        assert_eq!(raw.pimu.imu.heading, 1.5);
        assert_eq!(raw.reading(Actuator::Lift).effort, 12.0);
        assert_eq!(raw.position(Actuator::Gripper), 40.0);
        assert_eq!(raw.reading(Actuator::Gripper).effort, 3.0);
        assert_eq!(raw.position(Actuator::Arm), 0.0);
    }

    #[test]
    fn position_mut_targets_the_right_field() {
        let mut raw = RawStatus::default();
        *raw.position_mut(Actuator::WristPitch) = -0.4;
        assert_eq!(raw.end_of_arm.wrist_pitch.pos, -0.4);
        assert_eq!(raw.position(Actuator::WristPitch), -0.4);
    }

    #[test]
    fn gripper_uses_vendor_name() {
        assert_eq!(Actuator::Gripper.vendor_name(), "stretch_gripper");
        assert_eq!(Actuator::HeadTilt.vendor_name(), "head_tilt");
    }
}
