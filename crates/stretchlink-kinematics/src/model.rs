//! [`KinematicModel`] – joint configuration, frame placements and IK.
//!
//! The model owns one configuration vector `q` with one entry per actuated
//! (revolute or prismatic) joint, in declaration order.  Frame placements are
//! cached and only recomputed by [`KinematicModel::update`].

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use stretchlink_types::LinkError;
use tracing::{debug, warn};

use crate::chain::{ChainDescription, JointKind};
use crate::se3::{from_xyz_rpy, log6};

// ────────────────────────────────────────────────────────────────────────────
// IK policy
// ────────────────────────────────────────────────────────────────────────────

/// Tuning of the damped least-squares solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkPolicy {
    pub max_iterations: usize,
    /// Fraction of the solved joint step applied per iteration.
    pub step: f64,
    /// Added to the diagonal of `JᵀJ`.
    pub damping: f64,
    /// Convergence threshold on the norm of the 6-D pose error.
    pub tolerance: f64,
}

impl Default for IkPolicy {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            step: 0.1,
            damping: 1e-6,
            tolerance: 1e-4,
        }
    }
}

/// A converged IK result.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    pub q: DVector<f64>,
    pub iterations: usize,
    pub residual: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Joint {
    name: String,
    kind: JointKind,
    parent_frame: usize,
    child_frame: usize,
    origin: Isometry3<f64>,
    axis: Unit<Vector3<f64>>,
    /// Index into `q`, `None` for fixed joints.
    q_index: Option<usize>,
}

#[derive(Debug, Clone)]
struct Frame {
    name: String,
    /// Joint whose child this frame is; `None` for the root.
    parent_joint: Option<usize>,
}

/// Placements of every frame and of every joint's axis frame for one `q`.
struct Placements {
    frames: Vec<Isometry3<f64>>,
    joints: Vec<Isometry3<f64>>,
}

#[derive(Debug, Clone)]
pub struct KinematicModel {
    frames: Vec<Frame>,
    joints: Vec<Joint>,
    frame_index: HashMap<String, usize>,
    joint_index: HashMap<String, usize>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    q: DVector<f64>,
    placements: Vec<Isometry3<f64>>,
}

impl KinematicModel {
    /// Build a model at the neutral configuration (every joint at zero,
    /// clamped into its limits).
    pub fn new(description: &ChainDescription) -> Result<Self, LinkError> {
        description.validate()?;

        let mut frames = vec![Frame {
            name: description.root.clone(),
            parent_joint: None,
        }];
        let mut frame_index = HashMap::from([(description.root.clone(), 0)]);
        let mut joints = Vec::with_capacity(description.joints.len());
        let mut joint_index = HashMap::new();
        let mut lower = Vec::new();
        let mut upper = Vec::new();

        for (j, desc) in description.joints.iter().enumerate() {
            let parent_frame = *frame_index.get(&desc.parent).ok_or_else(|| {
                LinkError::InvalidChain(format!("unknown parent frame '{}'", desc.parent))
            })?;
            let child_frame = frames.len();
            frames.push(Frame {
                name: desc.child.clone(),
                parent_joint: Some(j),
            });
            frame_index.insert(desc.child.clone(), child_frame);

            let axis = match desc.kind {
                JointKind::Fixed => Vector3::x_axis(),
                _ => Unit::try_new(Vector3::from(desc.axis), 1e-9).ok_or_else(|| {
                    LinkError::InvalidChain(format!("joint '{}' has a zero axis", desc.name))
                })?,
            };
            let q_index = match desc.kind {
                JointKind::Fixed => None,
                _ => {
                    lower.push(desc.lower.unwrap_or(f64::NEG_INFINITY));
                    upper.push(desc.upper.unwrap_or(f64::INFINITY));
                    Some(lower.len() - 1)
                }
            };

            joint_index.insert(desc.name.clone(), j);
            joints.push(Joint {
                name: desc.name.clone(),
                kind: desc.kind,
                parent_frame,
                child_frame,
                origin: from_xyz_rpy(desc.xyz, desc.rpy),
                axis,
                q_index,
            });
        }

        let lower = DVector::from_vec(lower);
        let upper = DVector::from_vec(upper);
        let mut q = DVector::zeros(lower.len());
        clamp(&mut q, &lower, &upper);

        let mut model = Self {
            frames,
            joints,
            frame_index,
            joint_index,
            lower,
            upper,
            q,
            placements: Vec::new(),
        };
        model.update();
        Ok(model)
    }

    /// Number of configuration entries.
    pub fn nq(&self) -> usize {
        self.q.len()
    }

    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn lower_limits(&self) -> &DVector<f64> {
        &self.lower
    }

    pub fn upper_limits(&self) -> &DVector<f64> {
        &self.upper
    }

    pub fn has_frame(&self, name: &str) -> bool {
        self.frame_index.contains_key(name)
    }

    /// Index of `joint` in `q`.
    ///
    /// # Errors
    ///
    /// [`LinkError::JointNotFound`] for unknown or fixed joints.
    pub fn q_index(&self, joint: &str) -> Result<usize, LinkError> {
        self.joint_index
            .get(joint)
            .and_then(|&j| self.joints[j].q_index)
            .ok_or_else(|| LinkError::JointNotFound(joint.to_string()))
    }

    /// Set one joint of the cached configuration.  Call [`update`][Self::update]
    /// afterwards to refresh frame placements.
    pub fn set_joint(&mut self, joint: &str, value: f64) -> Result<(), LinkError> {
        let i = self.q_index(joint)?;
        self.q[i] = value;
        Ok(())
    }

    pub fn joint_value(&self, joint: &str) -> Result<f64, LinkError> {
        Ok(self.q[self.q_index(joint)?])
    }

    /// Replace the whole configuration.
    pub fn set_q(&mut self, q: DVector<f64>) -> Result<(), LinkError> {
        if q.len() != self.nq() {
            return Err(LinkError::Validation(format!(
                "configuration needs {} entries, received {}",
                self.nq(),
                q.len()
            )));
        }
        self.q = q;
        Ok(())
    }

    /// Recompute cached frame placements from the current configuration.
    pub fn update(&mut self) {
        self.placements = self.forward(&self.q).frames;
    }

    /// Placement of `frame` in the root frame, as of the last
    /// [`update`][Self::update].
    pub fn frame_placement(&self, frame: &str) -> Result<Isometry3<f64>, LinkError> {
        Ok(self.placements[self.frame_id(frame)?])
    }

    /// Transform taking coordinates in `to` into coordinates in `from`.
    ///
    /// # Errors
    ///
    /// [`LinkError::FrameNotFound`] if either frame is absent.
    pub fn transform(&self, from: &str, to: &str) -> Result<Isometry3<f64>, LinkError> {
        let from = self.frame_placement(from)?;
        let to = self.frame_placement(to)?;
        Ok(from.inverse() * to)
    }

    /// Local-frame Jacobian of `frame` at configuration `q`: maps joint
    /// velocities to the frame's twist `[v; ω]` expressed in the frame itself.
    pub fn frame_jacobian(&self, frame: &str, q: &DVector<f64>) -> Result<DMatrix<f64>, LinkError> {
        let id = self.frame_id(frame)?;
        let placements = self.forward(q);
        Ok(self.local_jacobian(id, &placements))
    }

    /// Solve for a configuration placing `frame` at `target` (root
    /// coordinates), starting from the current configuration.
    ///
    /// On success the model adopts the solution.  On failure it is left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// * [`LinkError::FrameNotFound`] before any iteration if `frame` is
    ///   absent.
    /// * [`LinkError::IkDidNotConverge`] when the iteration budget runs out.
    pub fn ik(
        &mut self,
        frame: &str,
        target: &Isometry3<f64>,
        policy: &IkPolicy,
    ) -> Result<IkSolution, LinkError> {
        let id = self.frame_id(frame)?;
        let mut q = self.q.clone();
        let mut residual = f64::INFINITY;
        let mut iterations = policy.max_iterations;

        for iteration in 0..policy.max_iterations {
            let placements = self.forward(&q);
            let current = placements.frames[id];
            let err = log6(&(current.inverse() * target));
            residual = err.norm();

            if residual < policy.tolerance {
                debug!(frame, iterations = iteration, residual, "IK converged");
                self.q = q.clone();
                self.placements = placements.frames;
                return Ok(IkSolution {
                    q,
                    iterations: iteration,
                    residual,
                });
            }

            let j = self.local_jacobian(id, &placements);
            let jt = j.transpose();
            let mut gram = &jt * &j;
            for i in 0..gram.nrows() {
                gram[(i, i)] += policy.damping;
            }
            let rhs = &jt * DVector::from_column_slice(err.as_slice());
            let Some(dq) = gram.cholesky().map(|c| c.solve(&rhs)) else {
                warn!(frame, iteration, "IK normal equations are not positive definite");
                iterations = iteration;
                break;
            };

            q += dq * policy.step;
            clamp(&mut q, &self.lower, &self.upper);
        }

        warn!(frame, iterations, residual, "IK did not converge");
        Err(LinkError::IkDidNotConverge {
            iterations,
            residual,
        })
    }

    fn frame_id(&self, frame: &str) -> Result<usize, LinkError> {
        self.frame_index
            .get(frame)
            .copied()
            .ok_or_else(|| LinkError::FrameNotFound(frame.to_string()))
    }

    fn forward(&self, q: &DVector<f64>) -> Placements {
        let mut frames = vec![Isometry3::identity(); self.frames.len()];
        let mut joints = Vec::with_capacity(self.joints.len());

        // Parents are declared before children, so one pass suffices.
        for joint in &self.joints {
            let joint_frame = frames[joint.parent_frame] * joint.origin;
            let value = joint.q_index.map_or(0.0, |i| q[i]);
            let motion = match joint.kind {
                JointKind::Revolute => Isometry3::from_parts(
                    Translation3::identity(),
                    UnitQuaternion::from_axis_angle(&joint.axis, value),
                ),
                JointKind::Prismatic => {
                    Isometry3::from_parts(Translation3::from(joint.axis.into_inner() * value), UnitQuaternion::identity())
                }
                JointKind::Fixed => Isometry3::identity(),
            };
            frames[joint.child_frame] = joint_frame * motion;
            joints.push(joint_frame);
        }
        Placements { frames, joints }
    }

    fn local_jacobian(&self, frame: usize, placements: &Placements) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(6, self.nq());
        let placement = placements.frames[frame];
        let r_inv = placement.rotation.inverse();
        let p = placement.translation.vector;

        let mut cursor = self.frames[frame].parent_joint;
        while let Some(j) = cursor {
            let joint = &self.joints[j];
            if let Some(col) = joint.q_index {
                let joint_frame = &placements.joints[j];
                let axis = joint_frame.rotation * joint.axis.into_inner();
                let (linear, angular) = match joint.kind {
                    JointKind::Revolute => {
                        let lever = p - joint_frame.translation.vector;
                        (axis.cross(&lever), axis)
                    }
                    _ => (axis, Vector3::zeros()),
                };
                jac.fixed_view_mut::<3, 1>(0, col).copy_from(&(r_inv * linear));
                jac.fixed_view_mut::<3, 1>(3, col).copy_from(&(r_inv * angular));
            }
            cursor = self.frames[joint.parent_frame].parent_joint;
        }
        jac
    }

    /// Names of the actuated joints in `q` order.
    pub fn joint_names(&self) -> Vec<&str> {
        self.joints
            .iter()
            .filter(|j| j.q_index.is_some())
            .map(|j| j.name.as_str())
            .collect()
    }

    /// Names of every frame, root first.
    pub fn frame_names(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.name.as_str()).collect()
    }
}

fn clamp(q: &mut DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) {
    for i in 0..q.len() {
        q[i] = q[i].clamp(lower[i], upper[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ARM_SEGMENTS;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const EE: &str = "link_grasp_center";

    fn stretch() -> KinematicModel {
        KinematicModel::new(&ChainDescription::stretch()).unwrap()
    }

    fn stretch_at(lift: f64, arm: f64, yaw: f64) -> KinematicModel {
        let mut model = stretch();
        model.set_joint("joint_lift", lift).unwrap();
        for segment in ARM_SEGMENTS {
            model.set_joint(segment, arm / 4.0).unwrap();
        }
        model.set_joint("joint_wrist_yaw", yaw).unwrap();
        model.update();
        model
    }

    #[test]
    fn stretch_model_has_eight_actuated_joints() {
        let model = stretch();
        assert_eq!(model.nq(), 8);
        assert_eq!(model.joint_names()[0], "joint_lift");
        assert_eq!(model.frame_names()[0], "base_link");
        assert!(model.has_frame(EE));
    }

    #[test]
    fn arm_extension_moves_grasp_center_along_minus_y() {
        let retracted = stretch_at(0.5, 0.0, 0.0);
        let extended = stretch_at(0.5, 0.4, 0.0);
        let a = retracted.transform("base_link", EE).unwrap().translation.vector;
        let b = extended.transform("base_link", EE).unwrap().translation.vector;
        assert_relative_eq!(b - a, Vector3::new(0.0, -0.4, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn lift_moves_grasp_center_up() {
        let low = stretch_at(0.2, 0.1, 0.0);
        let high = stretch_at(0.7, 0.1, 0.0);
        let dz = high.frame_placement(EE).unwrap().translation.z
            - low.frame_placement(EE).unwrap().translation.z;
        assert_relative_eq!(dz, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn transform_between_a_frame_and_itself_is_identity() {
        let model = stretch_at(0.5, 0.3, 0.4);
        let t = model.transform(EE, EE).unwrap();
        assert_relative_eq!(t.translation.vector, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(t.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_frames_are_reported() {
        let model = stretch();
        assert_eq!(
            model.transform("base_link", "tool0").unwrap_err(),
            LinkError::FrameNotFound("tool0".to_string())
        );
        assert_eq!(
            model.transform("world", EE).unwrap_err(),
            LinkError::FrameNotFound("world".to_string())
        );
        assert!(matches!(model.q_index("joint_grasp_center"), Err(LinkError::JointNotFound(_))));
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let model = stretch_at(0.5, 0.3, 0.3);
        let q = model.q().clone();
        let jac = model.frame_jacobian(EE, &q).unwrap();
        let base = model.forward(&q).frames[model.frame_id(EE).unwrap()];

        let h = 1e-7;
        for col in 0..model.nq() {
            let mut dq = q.clone();
            dq[col] += h;
            let moved = model.forward(&dq).frames[model.frame_id(EE).unwrap()];
            let numeric = log6(&(base.inverse() * moved)) / h;
            for row in 0..6 {
                assert_relative_eq!(jac[(row, col)], numeric[row], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn ik_on_current_pose_converges_immediately() {
        let mut model = stretch_at(0.5, 0.3, 0.2);
        let start = model.q().clone();
        let current = model.transform("base_link", EE).unwrap();

        let solution = model.ik(EE, &current, &IkPolicy::default()).unwrap();
        assert_eq!(solution.iterations, 0);
        assert!(solution.residual < 1e-4);
        assert_relative_eq!(solution.q, start);
    }

    #[test]
    fn ik_reaches_a_forward_step_along_the_grasp_axis() {
        let mut model = stretch_at(0.5, 0.3, 0.0);
        let current = model.transform("base_link", EE).unwrap();
        let target = current * Isometry3::translation(0.05, 0.0, 0.0);

        let solution = model.ik(EE, &target, &IkPolicy::default()).unwrap();
        assert!(solution.iterations < 200);

        let arm: f64 = ARM_SEGMENTS
            .iter()
            .map(|s| solution.q[model.q_index(s).unwrap()])
            .sum();
        assert_relative_eq!(arm, 0.35, epsilon = 1e-3);
        assert_relative_eq!(model.joint_value("joint_lift").unwrap(), 0.5, epsilon = 1e-3);
        assert_relative_eq!(model.joint_value("joint_wrist_yaw").unwrap(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn ik_reaches_a_small_yaw_rotation() {
        let mut model = stretch_at(0.6, 0.2, 0.0);
        let current = model.transform("base_link", EE).unwrap();
        // Yawing the wrist by 0.2 rad about its own axis.
        let yaw_axis = model.frame_placement("link_wrist_yaw").unwrap();
        let target_world = yaw_axis
            * Isometry3::rotation(Vector3::new(0.0, 0.0, 0.2))
            * (yaw_axis.inverse() * model.frame_placement(EE).unwrap());
        let target = model.frame_placement("base_link").unwrap().inverse() * target_world;
        assert!(log6(&(current.inverse() * target)).norm() > 1e-3);

        model.ik(EE, &target, &IkPolicy::default()).unwrap();
        assert_relative_eq!(model.joint_value("joint_wrist_yaw").unwrap(), 0.2, epsilon = 1e-3);
    }

    #[test]
    fn ik_on_unknown_frame_fails_before_iterating() {
        let mut model = stretch_at(0.5, 0.3, 0.0);
        let before = model.q().clone();
        let err = model
            .ik("tool0", &Isometry3::identity(), &IkPolicy::default())
            .unwrap_err();
        assert_eq!(err, LinkError::FrameNotFound("tool0".to_string()));
        assert_eq!(model.q(), &before);
    }

    #[test]
    fn unreachable_target_does_not_converge_and_leaves_model_untouched() {
        let mut model = stretch_at(0.5, 0.3, 0.0);
        let before = model.q().clone();
        // Ten metres above the robot, beyond the lift's travel.
        let target = Isometry3::translation(0.0, 0.0, 10.0);
        let policy = IkPolicy {
            max_iterations: 50,
            ..IkPolicy::default()
        };

        let err = model.ik(EE, &target, &policy).unwrap_err();
        assert!(matches!(err, LinkError::IkDidNotConverge { iterations: 50, .. }));
        assert_eq!(model.q(), &before);
    }

    #[test]
    fn singular_normal_equations_report_the_iterations_run() {
        // Two collinear slides make J^T J singular once damping is off.
        let chain = ChainDescription::from_toml_str(
            r#"
            root = "base"

            [[joint]]
            name = "outer"
            kind = "prismatic"
            parent = "base"
            child = "carriage"
            axis = [0.0, 0.0, 1.0]
            lower = -1.0
            upper = 1.0

            [[joint]]
            name = "inner"
            kind = "prismatic"
            parent = "carriage"
            child = "tip"
            axis = [0.0, 0.0, 1.0]
            lower = -1.0
            upper = 1.0
            "#,
        )
        .unwrap();
        let mut model = KinematicModel::new(&chain).unwrap();
        let policy = IkPolicy {
            damping: 0.0,
            ..IkPolicy::default()
        };

        let err = model
            .ik("tip", &Isometry3::translation(0.0, 0.0, 0.3), &policy)
            .unwrap_err();
        assert!(matches!(err, LinkError::IkDidNotConverge { iterations: 0, .. }), "{err:?}");
    }

    #[test]
    fn whole_configuration_can_be_replaced_within_limits() {
        let mut model = stretch();
        assert_eq!(model.lower_limits().len(), model.nq());
        assert_eq!(model.upper_limits().len(), model.nq());
        assert!(model.lower_limits().iter().zip(model.upper_limits().iter()).all(|(l, u)| l <= u));

        let lift = model.q_index("joint_lift").unwrap();
        let mut q = model.q().clone();
        q[lift] = 0.75;
        model.set_q(q).unwrap();
        model.update();
        assert_eq!(model.joint_value("joint_lift").unwrap(), 0.75);

        let err = model.set_q(DVector::zeros(3)).unwrap_err();
        assert!(matches!(err, LinkError::Validation(_)));
    }

    #[test]
    fn neutral_configuration_respects_limits() {
        let chain = ChainDescription::from_toml_str(
            r#"
            root = "base"

            [[joint]]
            name = "raised"
            kind = "prismatic"
            parent = "base"
            child = "tip"
            lower = 0.2
            upper = 0.4
            "#,
        )
        .unwrap();
        let model = KinematicModel::new(&chain).unwrap();
        assert_eq!(model.joint_value("raised").unwrap(), 0.2);
    }

    #[test]
    fn revolute_joint_rotates_child_frame() {
        let chain = ChainDescription::from_toml_str(
            r#"
            root = "base"

            [[joint]]
            name = "spin"
            kind = "revolute"
            parent = "base"
            child = "link"
            axis = [0.0, 0.0, 1.0]

            [[joint]]
            name = "tip"
            kind = "fixed"
            parent = "link"
            child = "tip"
            xyz = [1.0, 0.0, 0.0]
            "#,
        )
        .unwrap();
        let mut model = KinematicModel::new(&chain).unwrap();
        model.set_joint("spin", FRAC_PI_2).unwrap();
        model.update();
        let tip = model.frame_placement("tip").unwrap().translation.vector;
        assert_relative_eq!(tip, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }
}
