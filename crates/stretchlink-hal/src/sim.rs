//! In-process simulation backends for tests and `--sim` runs.
//!
//! [`SimRobot`] records every hardware call in a journal shared with its
//! [`SimHandle`], so tests can assert on exactly which primitives a command
//! produced.  Pushed targets are applied to the simulated status
//! immediately; [`RobotHardware::is_moving`] keeps reporting motion for the
//! configured motion time after each push.
//!
//! The speech backends ([`SimTextToSpeech`], [`SimAudioOutput`],
//! [`SimSpeechToText`], [`SimMicrophone`]) share a [`SimSpeechLog`] the same
//! way.
//!
//! # Example
//!
//! ```rust
//! use stretchlink_hal::sim::{HardwareCall, SimRobot};
//! use stretchlink_hal::{Actuator, RobotHardware};
//!
//! let mut robot = SimRobot::new().with_position(Actuator::Lift, 0.5);
//! let handle = robot.handle();
//!
//! robot.move_to(Actuator::Arm, 0.2).unwrap();
//! robot.push_command().unwrap();
//!
//! assert_eq!(
//!     handle.calls(),
//!     vec![HardwareCall::MoveTo(Actuator::Arm, 0.2), HardwareCall::PushCommand]
//! );
//! assert_eq!(handle.status().arm.pos, 0.2);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stretchlink_types::LinkError;
use tracing::debug;

use crate::camera::{Camera, CameraFrame};
use crate::hardware::{Actuator, RawStatus, RobotHardware};
use crate::speech::{
    AsrConfig, AsrProvider, AudioOutput, Microphone, PCM_SAMPLE_RATE, SpeechToText, TextToSpeech,
    TtsConfig, TtsProvider,
};

// ────────────────────────────────────────────────────────────────────────────
// Journal
// ────────────────────────────────────────────────────────────────────────────

/// One recorded call on a [`SimRobot`].
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCall {
    Startup,
    Home,
    PullStatus,
    TranslateBy(f64),
    RotateBy(f64),
    MoveTo(Actuator, f64),
    PushCommand,
    Stop,
    Shutdown,
}

impl HardwareCall {
    /// `true` for calls that command motion.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            HardwareCall::TranslateBy(_)
                | HardwareCall::RotateBy(_)
                | HardwareCall::MoveTo(..)
                | HardwareCall::PushCommand
        )
    }
}

#[derive(Debug, Default)]
struct SimState {
    status: RawStatus,
    pending: Vec<HardwareCall>,
    calls: Vec<HardwareCall>,
    homed: bool,
    moving_until: Option<Instant>,
}

/// Shared view into a [`SimRobot`]: read the journal, change the status.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded calls that command motion, ignoring status pulls.
    pub fn motion_calls(&self) -> Vec<HardwareCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_motion())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    pub fn status(&self) -> RawStatus {
        self.state.lock().status.clone()
    }

    pub fn set_status(&self, status: RawStatus) {
        self.state.lock().status = status;
    }

    pub fn set_position(&self, actuator: Actuator, value: f64) {
        *self.state.lock().status.position_mut(actuator) = value;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRobot
// ────────────────────────────────────────────────────────────────────────────

/// Simulated robot.  Succeeds at everything unless configured otherwise.
#[derive(Debug)]
pub struct SimRobot {
    state: Arc<Mutex<SimState>>,
    reachable: bool,
    homing_works: bool,
    motion_time: Duration,
}

impl Default for SimRobot {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRobot {
    /// A reachable, already homed robot at the zero pose.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                homed: true,
                ..SimState::default()
            })),
            reachable: true,
            homing_works: true,
            motion_time: Duration::ZERO,
        }
    }

    /// Make [`RobotHardware::startup`] fail.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Start un-homed; `homing_works` decides whether `home()` fixes it.
    pub fn unhomed(mut self, homing_works: bool) -> Self {
        self.state.lock().homed = false;
        self.homing_works = homing_works;
        self
    }

    pub fn with_status(self, status: RawStatus) -> Self {
        self.state.lock().status = status;
        self
    }

    pub fn with_position(self, actuator: Actuator, value: f64) -> Self {
        *self.state.lock().status.position_mut(actuator) = value;
        self
    }

    /// Report motion for `motion_time` after every push that moved
    /// something.
    pub fn with_motion_time(mut self, motion_time: Duration) -> Self {
        self.motion_time = motion_time;
        self
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: HardwareCall) {
        self.state.lock().calls.push(call);
    }

    fn queue(&self, call: HardwareCall) {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        state.pending.push(call);
    }
}

impl RobotHardware for SimRobot {
    fn startup(&mut self) -> bool {
        self.record(HardwareCall::Startup);
        self.reachable
    }

    fn is_homed(&self) -> bool {
        self.state.lock().homed
    }

    fn home(&mut self) -> Result<(), LinkError> {
        self.record(HardwareCall::Home);
        if self.homing_works {
            self.state.lock().homed = true;
        }
        Ok(())
    }

    fn pull_status(&mut self) -> Result<RawStatus, LinkError> {
        let mut state = self.state.lock();
        state.calls.push(HardwareCall::PullStatus);
        Ok(state.status.clone())
    }

    fn translate_by(&mut self, metres: f64) -> Result<(), LinkError> {
        self.queue(HardwareCall::TranslateBy(metres));
        Ok(())
    }

    fn rotate_by(&mut self, radians: f64) -> Result<(), LinkError> {
        self.queue(HardwareCall::RotateBy(radians));
        Ok(())
    }

    fn move_to(&mut self, actuator: Actuator, value: f64) -> Result<(), LinkError> {
        self.queue(HardwareCall::MoveTo(actuator, value));
        Ok(())
    }

    fn push_command(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.calls.push(HardwareCall::PushCommand);
        let pending = std::mem::take(&mut state.pending);
        if !pending.is_empty() {
            state.moving_until = Some(Instant::now() + self.motion_time);
        }
        for call in pending {
            match call {
                HardwareCall::TranslateBy(d) => {
                    let theta = state.status.base.theta;
                    state.status.base.x += d * theta.cos();
                    state.status.base.y += d * theta.sin();
                }
                HardwareCall::RotateBy(r) => state.status.base.theta += r,
                HardwareCall::MoveTo(actuator, value) => {
                    *state.status.position_mut(actuator) = value;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn is_moving(&mut self) -> Result<bool, LinkError> {
        let state = self.state.lock();
        Ok(state.moving_until.is_some_and(|until| Instant::now() < until))
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.calls.push(HardwareCall::Stop);
        state.pending.clear();
        state.moving_until = None;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), LinkError> {
        debug!("sim robot shutting down");
        self.record(HardwareCall::Shutdown);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimCamera
// ────────────────────────────────────────────────────────────────────────────

/// Simulated camera producing blank frames at a fixed rate.
#[derive(Debug, Clone)]
pub struct SimCamera {
    name: String,
    width: u32,
    height: u32,
    depth: bool,
    period: Duration,
}

impl SimCamera {
    pub fn new(name: impl Into<String>, width: u32, height: u32, fps: u32, depth: bool) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth,
            period: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
        }
    }

    fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Camera for SimCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_depth(&self) -> bool {
        self.depth
    }

    fn read(&mut self) -> Result<CameraFrame, LinkError> {
        std::thread::sleep(self.period);
        Ok(CameraFrame {
            width: self.width,
            height: self.height,
            color: vec![0u8; self.pixels() * 3],
            depth: self.depth.then(|| vec![0u8; self.pixels() * 2]),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Speech
// ────────────────────────────────────────────────────────────────────────────

/// PCM bytes synthesized per character of text.
const PCM_BYTES_PER_CHAR: usize = 320;

/// Bytes in one simulated microphone chunk (20 ms of audio).
const MIC_CHUNK_BYTES: usize = (PCM_SAMPLE_RATE as usize / 50) * 2;

#[derive(Debug, Default)]
struct SpeechState {
    spoken: Vec<String>,
    played: Vec<usize>,
    sessions: usize,
}

/// Shared record of what the simulated speech backends did.
#[derive(Debug, Clone, Default)]
pub struct SimSpeechLog {
    state: Arc<Mutex<SpeechState>>,
}

impl SimSpeechLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts handed to [`SimTextToSpeech::convert`], in order.
    pub fn spoken(&self) -> Vec<String> {
        self.state.lock().spoken.clone()
    }

    /// Byte length of every buffer played by [`SimAudioOutput`].
    pub fn played(&self) -> Vec<usize> {
        self.state.lock().played.clone()
    }

    /// Recognition sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.state.lock().sessions
    }
}

/// Synthesizes silence whose length follows the text length.
#[derive(Debug, Clone)]
pub struct SimTextToSpeech {
    provider: TtsProvider,
    log: SimSpeechLog,
    fail: bool,
}

impl SimTextToSpeech {
    pub fn new(provider: TtsProvider, log: SimSpeechLog) -> Self {
        Self {
            provider,
            log,
            fail: false,
        }
    }

    /// Reject every request as a provider error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl TextToSpeech for SimTextToSpeech {
    fn provider(&self) -> TtsProvider {
        self.provider
    }

    fn convert(&mut self, text: &str, _config: &TtsConfig) -> Result<Vec<u8>, LinkError> {
        if self.fail {
            return Err(LinkError::Hardware {
                component: self.provider.to_string(),
                details: "synthesis rejected".to_string(),
            });
        }
        self.log.state.lock().spoken.push(text.to_string());
        Ok(vec![0u8; text.chars().count() * PCM_BYTES_PER_CHAR])
    }
}

/// Discards audio after recording its length.
#[derive(Debug, Clone)]
pub struct SimAudioOutput {
    log: SimSpeechLog,
}

impl SimAudioOutput {
    pub fn new(log: SimSpeechLog) -> Self {
        Self { log }
    }
}

impl AudioOutput for SimAudioOutput {
    fn play(&mut self, pcm: &[u8]) -> Result<(), LinkError> {
        self.log.state.lock().played.push(pcm.len());
        Ok(())
    }
}

/// Returns a scripted transcript once enough audio has been streamed.
#[derive(Debug, Clone)]
pub struct SimSpeechToText {
    provider: AsrProvider,
    log: SimSpeechLog,
    transcript: String,
    chunks_needed: usize,
    chunks_seen: usize,
    connected: bool,
}

impl SimSpeechToText {
    /// Hears `transcript` after `chunks_needed` audio chunks.  An empty
    /// transcript means the speaker never says anything.
    pub fn new(
        provider: AsrProvider,
        log: SimSpeechLog,
        transcript: impl Into<String>,
        chunks_needed: usize,
    ) -> Self {
        Self {
            provider,
            log,
            transcript: transcript.into(),
            chunks_needed,
            chunks_seen: 0,
            connected: false,
        }
    }

    fn not_connected(&self) -> LinkError {
        LinkError::Hardware {
            component: self.provider.to_string(),
            details: "session not connected".to_string(),
        }
    }
}

impl SpeechToText for SimSpeechToText {
    fn provider(&self) -> AsrProvider {
        self.provider
    }

    fn connect(&mut self, _config: &AsrConfig) -> Result<(), LinkError> {
        self.connected = true;
        self.chunks_seen = 0;
        self.log.state.lock().sessions += 1;
        Ok(())
    }

    fn send_audio(&mut self, _chunk: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(self.not_connected());
        }
        self.chunks_seen += 1;
        Ok(())
    }

    fn receive_transcript(&mut self) -> Result<Option<String>, LinkError> {
        if !self.connected {
            return Err(self.not_connected());
        }
        let heard = self.chunks_seen >= self.chunks_needed && !self.transcript.is_empty();
        Ok(heard.then(|| self.transcript.clone()))
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.connected = false;
        Ok(())
    }
}

/// Captures 20 ms chunks of silence in real time.
#[derive(Debug, Clone, Default)]
pub struct SimMicrophone {
    running: bool,
}

impl SimMicrophone {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Microphone for SimMicrophone {
    fn start(&mut self) -> Result<(), LinkError> {
        self.running = true;
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        if !self.running {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(20));
        Ok(Some(vec![0u8; MIC_CHUNK_BYTES]))
    }

    fn stop(&mut self) {
        self.running = false;
    }
}
