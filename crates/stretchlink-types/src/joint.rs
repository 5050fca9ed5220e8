//! Joint ordering shared by [`ManipulatorCommand`][crate::ManipulatorCommand]
//! and [`Status`][crate::Status].
//!
//! The position of a joint in every N-length vector on the wire is its
//! [`JointName::index`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of entries in every command/status joint vector.
pub const NUM_JOINTS: usize = 10;

/// Named degrees of freedom exposed at the wire level, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    BaseTranslate,
    BaseRotate,
    Lift,
    Arm,
    HeadPan,
    HeadTilt,
    WristYaw,
    WristPitch,
    WristRoll,
    Gripper,
}

impl JointName {
    /// All joints in wire order.
    pub const ALL: [JointName; NUM_JOINTS] = [
        JointName::BaseTranslate,
        JointName::BaseRotate,
        JointName::Lift,
        JointName::Arm,
        JointName::HeadPan,
        JointName::HeadTilt,
        JointName::WristYaw,
        JointName::WristPitch,
        JointName::WristRoll,
        JointName::Gripper,
    ];

    /// Index of this joint in command and status vectors.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Joint at `index`, or `None` past the end of the vector.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// `true` for the base joints, whose values are deltas rather than
    /// absolute positions.
    pub fn is_relative(self) -> bool {
        matches!(self, JointName::BaseTranslate | JointName::BaseRotate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JointName::BaseTranslate => "base_translate",
            JointName::BaseRotate => "base_rotate",
            JointName::Lift => "lift",
            JointName::Arm => "arm",
            JointName::HeadPan => "head_pan",
            JointName::HeadTilt => "head_tilt",
            JointName::WristYaw => "wrist_yaw",
            JointName::WristPitch => "wrist_pitch",
            JointName::WristRoll => "wrist_roll",
            JointName::Gripper => "gripper",
        }
    }
}

impl fmt::Display for JointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
