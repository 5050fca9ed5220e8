//! `stretchlink-driver` – the robot-side process.
//!
//! Owns the hardware through one [`RobotController`] and exposes it over
//! the bus: streamed commands are dispatched by topic, servo commands go
//! through inverse kinematics, `goto` is a blocking request/reply move,
//! status is published at a fixed rate, and text can be spoken or heard
//! through the speech endpoints.
//!
//! # Modules
//!
//! - [`controller`] – [`RobotController`]: startup, command execution,
//!   servo solving, status sampling.
//! - [`policy`] – [`MotionPolicy`] rules checked before base motion.
//! - [`dispatcher`] – [`Dispatcher`]: topic → schema → handler routing.
//! - [`services`] – status publisher, `goto` handler, camera loop.
//! - [`speech`] – speak loop and listen handler over the speech traits.
//! - [`server`] – binds every endpoint and starts the services.
//! - [`telemetry`] – `tracing` subscriber and optional OTLP export.

pub mod controller;
pub mod dispatcher;
pub mod policy;
pub mod server;
pub mod services;
pub mod speech;
pub mod telemetry;

pub use controller::{ControllerSettings, Outcome, RobotController, SharedController, goto};
pub use dispatcher::{Dispatch, Dispatcher};
pub use policy::{BaseExclusivityRule, MotionPolicy, Rule};
pub use server::{BoundAddrs, CameraBinding, Peripherals, RunningServer, ServerSettings, serve};
pub use speech::{SharedSpeechInput, SpeechInput, SpeechOutput};
