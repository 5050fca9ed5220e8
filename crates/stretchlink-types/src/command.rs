//! Fire-and-forget motion commands.
//!
//! | Topic         | Record                  |
//! |---------------|-------------------------|
//! | `manipulator` | [`ManipulatorCommand`]  |
//! | `base`        | [`BaseCommand`]         |

use serde::{Deserialize, Serialize};

use crate::geometry::Twist2D;
use crate::joint::{JointName, NUM_JOINTS};
use crate::schema::WireMessage;
use crate::LinkError;

/// Joint-space command: one value per [`JointName`], in wire order.
///
/// `base_translate` and `base_rotate` are deltas (metres, radians); every
/// other entry is an absolute target in the actuator's native unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulatorCommand {
    joint_positions: Vec<f64>,
}

impl ManipulatorCommand {
    /// Build a command from an arbitrary-length vector.
    ///
    /// # Errors
    ///
    /// [`LinkError::Validation`] when `joint_positions.len() != NUM_JOINTS`.
    pub fn new(joint_positions: Vec<f64>) -> Result<Self, LinkError> {
        let command = Self { joint_positions };
        command.validate()?;
        Ok(command)
    }

    /// Infallible constructor for a correctly sized vector.
    pub fn from_array(joint_positions: [f64; NUM_JOINTS]) -> Self {
        Self {
            joint_positions: joint_positions.to_vec(),
        }
    }

    pub fn joint_positions(&self) -> &[f64] {
        &self.joint_positions
    }

    /// Value for `joint`, or `None` if a skip-validated record is too short.
    pub fn get(&self, joint: JointName) -> Option<f64> {
        self.joint_positions.get(joint.index()).copied()
    }

    /// `(base_translate, base_rotate)`, zero for missing entries.
    pub fn base_deltas(&self) -> Twist2D {
        Twist2D::new(
            self.get(JointName::BaseTranslate).unwrap_or(0.0),
            self.get(JointName::BaseRotate).unwrap_or(0.0),
        )
    }
}

impl WireMessage for ManipulatorCommand {
    const NAME: &'static str = "ManipulatorCommand";

    fn validate(&self) -> Result<(), LinkError> {
        if self.joint_positions.len() != NUM_JOINTS {
            return Err(LinkError::Validation(format!(
                "need {NUM_JOINTS} joint positions, received {}",
                self.joint_positions.len()
            )));
        }
        Ok(())
    }
}

/// How the base interprets a [`BaseCommand`] twist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseMode {
    /// Continuous velocity control.  Not supported by the driver.
    #[default]
    Velocity,
    /// Relative move: `linear` metres forward or `angular` radians.
    Position,
}

/// Mobile base command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseCommand {
    #[serde(default)]
    pub mode: BaseMode,
    pub twist: Twist2D,
}

impl BaseCommand {
    pub fn position(linear: f64, angular: f64) -> Self {
        Self {
            mode: BaseMode::Position,
            twist: Twist2D::new(linear, angular),
        }
    }

    pub fn velocity(linear: f64, angular: f64) -> Self {
        Self {
            mode: BaseMode::Velocity,
            twist: Twist2D::new(linear, angular),
        }
    }
}

impl WireMessage for BaseCommand {
    const NAME: &'static str = "BaseCommand";
}
