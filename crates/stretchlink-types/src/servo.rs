use serde::{Deserialize, Serialize};

use crate::geometry::Pose3D;
use crate::schema::WireMessage;
use crate::LinkError;

/// Cartesian servo step for the end effector.
///
/// `ee_pose` is a delta expressed in the current end-effector frame;
/// `gripper` is an absolute aperture, `0.0` closed and `1.0` fully open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoCommand {
    ee_pose: Pose3D,
    gripper: f64,
}

impl ServoCommand {
    /// # Errors
    ///
    /// [`LinkError::Validation`] when `gripper` is outside `[0, 1]` or NaN.
    pub fn new(ee_pose: Pose3D, gripper: f64) -> Result<Self, LinkError> {
        let command = Self { ee_pose, gripper };
        command.validate()?;
        Ok(command)
    }

    pub fn ee_pose(&self) -> &Pose3D {
        &self.ee_pose
    }

    pub fn gripper(&self) -> f64 {
        self.gripper
    }
}

impl WireMessage for ServoCommand {
    const NAME: &'static str = "ServoCommand";

    fn validate(&self) -> Result<(), LinkError> {
        if !(0.0..=1.0).contains(&self.gripper) {
            return Err(LinkError::Validation(format!(
                "gripper must be in [0, 1], got {}",
                self.gripper
            )));
        }
        Ok(())
    }
}
