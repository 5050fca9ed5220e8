//! `stretchlink-hal` – the hardware seam.
//!
//! The driver never talks to a vendor SDK directly.  It talks to the
//! [`RobotHardware`], [`Camera`] and speech traits; real robots and the simulator
//! implement them.
//!
//! # Modules
//!
//! - [`hardware`] – [`RobotHardware`] trait, [`Actuator`] set and the
//!   [`RawStatus`] vendor status map.
//! - [`table`] – declarative joint table mapping each wire joint to where its
//!   state is read and how it is commanded.
//! - [`camera`] – [`Camera`] trait and [`CameraFrame`].
//! - [`speech`] – [`TextToSpeech`], [`SpeechToText`] and the audio device
//!   traits, with [`transcribe`] driving a recognition session.
//! - [`sim`] – simulated robot, camera and speech backends for tests and
//!   `--sim` runs.

pub mod camera;
pub mod hardware;
pub mod sim;
pub mod speech;
pub mod table;

pub use camera::{Camera, CameraFrame};
pub use hardware::{Actuator, MOTION_POLL_PERIOD, RawStatus, RobotHardware};
pub use sim::{
    HardwareCall, SimAudioOutput, SimCamera, SimHandle, SimMicrophone, SimRobot, SimSpeechLog,
    SimSpeechToText, SimTextToSpeech,
};
pub use speech::{
    AsrConfig, AsrProvider, AudioOutput, Microphone, SpeechToText, TextToSpeech, TtsConfig,
    TtsProvider, transcribe,
};
pub use table::{JOINT_TABLE, JointSource, status_from_raw};
