//! [`RobotController`] – the single owner of the hardware handle.
//!
//! Every service reaches the robot through one [`SharedController`], so at
//! most one hardware call is in flight at any time.  Locks are held for a
//! single operation; [`goto`] releases the controller while the base moves.
//!
//! | Operation | Base exclusivity violated | Result |
//! |---|---|---|
//! | [`execute_manipulator_command`](RobotController::execute_manipulator_command) | warn, [`Outcome::Discarded`] | per-joint primitives + one push |
//! | [`execute_base_command`](RobotController::execute_base_command) | warn, [`Outcome::Discarded`] | translate or rotate + one push |
//! | [`goto`] | `Err(Validation)` | translate or rotate, push, poll until idle |
//! | [`servo`](RobotController::servo) | n/a | IK, then the manipulator path |

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stretchlink_hal::{JOINT_TABLE, JointSource, RobotHardware, status_from_raw, table};
use stretchlink_kinematics::{ChainDescription, IkPolicy, JointMapping, KinematicModel, se3};
use stretchlink_types::{
    BaseCommand, BaseMode, JointName, LinkError, ManipulatorCommand, NUM_JOINTS, ServoCommand,
    Status, Twist2D,
};
use tracing::{debug, info, instrument, warn};

use crate::policy::MotionPolicy;

/// Hardware gripper range is `[0, 100]`; servo commands use `[0, 1]`.
pub const GRIPPER_SCALE: f64 = 100.0;

/// Completion poll period of [`goto`].
pub const GOTO_POLL_PERIOD: Duration = Duration::from_millis(10);

pub type SharedController = Arc<Mutex<RobotController>>;

/// Kinematic setup for the servo path.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub chain: ChainDescription,
    pub ee_frame: String,
    pub base_frame: String,
    pub ik: IkPolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            chain: ChainDescription::stretch(),
            ee_frame: "link_grasp_center".to_string(),
            base_frame: "base_link".to_string(),
            ik: IkPolicy::default(),
        }
    }
}

/// What happened to a fire-and-forget command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Executed,
    /// Dropped by the motion policy; nothing reached the hardware.
    Discarded(String),
}

pub struct RobotController {
    hardware: Box<dyn RobotHardware>,
    model: KinematicModel,
    mapping: JointMapping,
    policy: MotionPolicy,
    settings: ControllerSettings,
}

impl RobotController {
    /// Bring the robot up: connect, home if needed, build the kinematic
    /// model.
    ///
    /// # Errors
    ///
    /// [`LinkError::Startup`] if the robot is unreachable, cannot be homed,
    /// or the chain does not contain the configured frames.
    pub fn start(
        mut hardware: Box<dyn RobotHardware>,
        settings: ControllerSettings,
    ) -> Result<Self, LinkError> {
        info!("starting robot");
        if !hardware.startup() {
            return Err(LinkError::Startup("robot is not reachable".to_string()));
        }

        if !hardware.is_homed() {
            info!("robot not homed, homing");
            hardware
                .home()
                .map_err(|e| LinkError::Startup(format!("homing failed: {e}")))?;
        }
        if !hardware.is_homed() {
            return Err(LinkError::Startup("robot is not homed".to_string()));
        }

        let model = KinematicModel::new(&settings.chain)
            .map_err(|e| LinkError::Startup(format!("kinematic chain: {e}")))?;
        for frame in [&settings.ee_frame, &settings.base_frame] {
            if !model.has_frame(frame) {
                return Err(LinkError::Startup(format!(
                    "kinematic chain has no frame '{frame}'"
                )));
            }
        }
        let mapping = JointMapping::from_description(&settings.chain);

        info!(
            dof = model.nq(),
            ee_frame = %settings.ee_frame,
            "robot started"
        );
        Ok(Self {
            hardware,
            model,
            mapping,
            policy: MotionPolicy::standard(),
            settings,
        })
    }

    pub fn into_shared(self) -> SharedController {
        Arc::new(Mutex::new(self))
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    // ── Fire-and-forget commands ────────────────────────────────────────────

    /// Apply a joint-space command.
    ///
    /// Base entries equal to `0.0` are skipped; every other joint is
    /// commanded, then the batch is pushed once.
    ///
    /// # Errors
    ///
    /// [`LinkError::Validation`] for a record without exactly one value per
    /// joint (possible only with validation skipped); any hardware error.
    pub fn execute_manipulator_command(
        &mut self,
        command: &ManipulatorCommand,
    ) -> Result<Outcome, LinkError> {
        let positions = command.joint_positions();
        if positions.len() != NUM_JOINTS {
            return Err(LinkError::Validation(format!(
                "need {NUM_JOINTS} joint positions, received {}",
                positions.len()
            )));
        }

        if let Err(e) = self.policy.check(&command.base_deltas()) {
            warn!(error = %e, "discarding manipulator command");
            return Ok(Outcome::Discarded(e.to_string()));
        }

        for ((joint, source), &value) in JOINT_TABLE.iter().zip(positions) {
            match source {
                JointSource::Relative => {
                    if value == 0.0 {
                        continue;
                    }
                    self.apply_base_delta(*joint, value)?;
                }
                JointSource::Actuator(actuator) => self.hardware.move_to(*actuator, value)?,
            }
        }
        self.hardware.push_command()?;
        Ok(Outcome::Executed)
    }

    /// Apply a base command.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotImplemented`] for velocity mode; any hardware error.
    pub fn execute_base_command(&mut self, command: &BaseCommand) -> Result<Outcome, LinkError> {
        match command.mode {
            BaseMode::Velocity => Err(LinkError::NotImplemented(
                "velocity control of the base".to_string(),
            )),
            BaseMode::Position => {
                if let Err(e) = self.policy.check(&command.twist) {
                    warn!(error = %e, "discarding base command");
                    return Ok(Outcome::Discarded(e.to_string()));
                }
                self.move_base(&command.twist)?;
                self.hardware.push_command()?;
                Ok(Outcome::Executed)
            }
        }
    }

    // ── Blocking move ───────────────────────────────────────────────────────

    /// Issue the base move of a [`goto`] without waiting for it.
    ///
    /// # Errors
    ///
    /// [`LinkError::Validation`] for a compound twist, checked before any
    /// hardware call; any hardware error.
    pub fn start_goto(&mut self, twist: Twist2D) -> Result<(), LinkError> {
        self.policy.check(&twist)?;
        self.move_base(&twist)?;
        self.hardware.push_command()
    }

    pub fn is_moving(&mut self) -> Result<bool, LinkError> {
        self.hardware.is_moving()
    }

    // ── Servo ───────────────────────────────────────────────────────────────

    /// Solve a servo command and execute the result as a manipulator
    /// command.  Nothing is sent to the hardware if IK fails.
    #[instrument(level = "debug", skip_all)]
    pub fn servo(&mut self, command: &ServoCommand) -> Result<Outcome, LinkError> {
        let target = self.solve_servo(command)?;
        debug!(joint_positions = ?target.joint_positions(), "servo solved");
        self.execute_manipulator_command(&target)
    }

    /// Joint-space command reaching `current ∘ delta` for the end effector.
    ///
    /// Head and base entries are `0.0`; the gripper is scaled to the
    /// hardware range.  Only reads hardware status.
    ///
    /// # Errors
    ///
    /// [`LinkError::Validation`] for an unusable orientation quaternion,
    /// [`LinkError::IkDidNotConverge`] when no solution is found, or a
    /// hardware error while sampling.
    pub fn solve_servo(&mut self, command: &ServoCommand) -> Result<ManipulatorCommand, LinkError> {
        let raw = self.hardware.pull_status()?;
        let sampled: Vec<(JointName, f64)> = self
            .mapping
            .joints()
            .map(|joint| (joint, table::reading(&raw, joint).pos))
            .collect();
        self.mapping.write(&mut self.model, &sampled)?;
        self.model.update();

        let ee = self.settings.ee_frame.as_str();
        let base = self.settings.base_frame.as_str();
        let current = self.model.transform(base, ee)?;
        let delta = se3::from_pose(command.ee_pose())?;
        let target = self.model.frame_placement(base)? * current * delta;

        let solution = self.model.ik(ee, &target, &self.settings.ik)?;
        debug!(
            iterations = solution.iterations,
            residual = solution.residual,
            "servo IK converged"
        );

        let mut positions = [0.0; NUM_JOINTS];
        for joint in self.mapping.joints() {
            positions[joint.index()] = self.mapping.read(&self.model, &solution.q, joint)?;
        }
        positions[JointName::Gripper.index()] = command.gripper() * GRIPPER_SCALE;
        Ok(ManipulatorCommand::from_array(positions))
    }

    // ── Status and lifecycle ────────────────────────────────────────────────

    pub fn get_status(&mut self) -> Result<Status, LinkError> {
        let raw = self.hardware.pull_status()?;
        Ok(status_from_raw(&raw))
    }

    pub fn stop(&mut self) -> Result<(), LinkError> {
        info!("stopping robot");
        self.hardware.stop()
    }

    pub fn shutdown(&mut self) -> Result<(), LinkError> {
        info!("shutting down robot");
        self.hardware.shutdown()
    }

    fn move_base(&mut self, twist: &Twist2D) -> Result<(), LinkError> {
        if twist.linear != 0.0 {
            self.hardware.translate_by(twist.linear)?;
        }
        if twist.angular != 0.0 {
            self.hardware.rotate_by(twist.angular)?;
        }
        Ok(())
    }

    fn apply_base_delta(&mut self, joint: JointName, value: f64) -> Result<(), LinkError> {
        match joint {
            JointName::BaseTranslate => self.hardware.translate_by(value),
            JointName::BaseRotate => self.hardware.rotate_by(value),
            other => Err(LinkError::Hardware {
                component: other.to_string(),
                details: "not a relative base joint".to_string(),
            }),
        }
    }
}

/// Move the base and block until the hardware reports completion.
///
/// The controller is locked to issue the move and for each completion
/// poll, never across the wait, so status sampling and streamed commands
/// keep reaching the robot while the base moves.
///
/// # Errors
///
/// See [`RobotController::start_goto`].
#[instrument(level = "debug", skip(controller))]
pub fn goto(controller: &SharedController, twist: Twist2D) -> Result<(), LinkError> {
    controller.lock().start_goto(twist)?;
    loop {
        let moving = controller.lock().is_moving()?;
        if !moving {
            return Ok(());
        }
        std::thread::sleep(GOTO_POLL_PERIOD);
    }
}
