//! `stretchlink-types` – shared vocabulary of the StretchLink stack.
//!
//! Every process on the bus (the driver, teleop consoles, status monitors)
//! agrees on the records defined here.
//!
//! # Modules
//!
//! - [`joint`] – [`JointName`][joint::JointName]: the fixed joint ordering
//!   shared by command and status vectors.
//! - [`schema`] – [`WireMessage`][schema::WireMessage]: MessagePack encoding
//!   with field-name-keyed maps, plus the process-wide
//!   [`ValidationMode`][schema::ValidationMode].
//! - [`geometry`] – small value types (vectors, poses, twists).
//! - [`command`] – [`ManipulatorCommand`][command::ManipulatorCommand] and
//!   [`BaseCommand`][command::BaseCommand].
//! - [`servo`] – [`ServoCommand`][servo::ServoCommand]: relative end-effector
//!   delta plus absolute gripper aperture.
//! - [`status`] – [`Status`][status::Status] snapshot published by the driver.

pub mod command;
pub mod geometry;
pub mod joint;
pub mod schema;
pub mod servo;
pub mod status;

pub use command::{BaseCommand, BaseMode, ManipulatorCommand};
pub use geometry::{Orientation, Pose2D, Pose3D, Twist2D, Vector3D, Vector4D};
pub use joint::{JointName, NUM_JOINTS};
pub use schema::{ValidationMode, WireMessage};
pub use servo::ServoCommand;
pub use status::{Imu, Odometry, Status};

use thiserror::Error;

/// Global error type spanning wire decoding, hardware faults and kinematics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// A payload decoded but violated its schema, or could not be decoded at all.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// The multipart envelope had the wrong shape.
    #[error("Framing Error: {0}")]
    Framing(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Hardware Fault on {component}: {details}")]
    Hardware { component: String, details: String },

    /// A declared capability the hardware collaborator does not provide.
    #[error("Not Implemented: {0}")]
    NotImplemented(String),

    #[error("Frame '{0}' not found")]
    FrameNotFound(String),

    #[error("Joint '{0}' not found")]
    JointNotFound(String),

    #[error("IK did not converge after {iterations} iterations (error {residual:.6})")]
    IkDidNotConverge { iterations: usize, residual: f64 },

    #[error("Invalid Kinematic Chain: {0}")]
    InvalidChain(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    /// Fatal: the service must not start.
    #[error("Startup Failure: {0}")]
    Startup(String),
}
