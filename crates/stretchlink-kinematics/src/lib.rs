//! `stretchlink-kinematics` – forward and inverse kinematics over a jointed
//! chain.
//!
//! # Modules
//!
//! - [`chain`] – [`ChainDescription`]: the chain as data (TOML-loadable),
//!   plus the built-in Stretch description.
//! - [`model`] – [`KinematicModel`]: joint configuration, frame placements,
//!   frame Jacobians and damped least-squares IK.
//! - [`mapping`] – [`JointMapping`]: physical actuators ↔ model joints
//!   (the telescoping arm is several equal prismatic segments).
//! - [`se3`] – SE(3) helpers (`log6`, transform construction).
//!
//! # Example
//!
//! ```rust
//! use stretchlink_kinematics::{ChainDescription, IkPolicy, KinematicModel};
//!
//! let mut model = KinematicModel::new(&ChainDescription::stretch()).unwrap();
//! model.set_joint("joint_lift", 0.5).unwrap();
//! model.update();
//!
//! let current = model.transform("base_link", "link_grasp_center").unwrap();
//! let solution = model.ik("link_grasp_center", &current, &IkPolicy::default()).unwrap();
//! assert!(solution.residual < 1e-4);
//! ```

pub mod chain;
pub mod mapping;
pub mod model;
pub mod se3;

pub use chain::{ChainDescription, JointDescription, JointKind, SegmentGroup};
pub use mapping::JointMapping;
pub use model::{IkPolicy, IkSolution, KinematicModel};
