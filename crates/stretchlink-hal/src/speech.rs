//! Speech capability traits: text-to-speech output and streaming speech
//! recognition.
//!
//! Providers are picked by name from configuration ([`TtsProvider`],
//! [`AsrProvider`]).  One-shot synthesis goes through
//! [`TextToSpeech::convert`]; recognition is a streaming session
//! (`connect`, `send_audio`, `receive_transcript`, `close`) driven by
//! [`transcribe`].
//!
//! Audio is 16-bit little-endian mono PCM at [`PCM_SAMPLE_RATE`].

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use stretchlink_types::LinkError;
use tracing::{debug, info, warn};

pub const PCM_SAMPLE_RATE: u32 = 16_000;

/// Sleep between microphone reads that returned no audio.
const IDLE_POLL: Duration = Duration::from_millis(10);

// ────────────────────────────────────────────────────────────────────────────
// Providers
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtsProvider {
    #[serde(rename = "fish_audio")]
    FishAudio,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
}

impl TtsProvider {
    pub const ALL: [TtsProvider; 2] = [TtsProvider::FishAudio, TtsProvider::ElevenLabs];

    pub fn as_str(self) -> &'static str {
        match self {
            TtsProvider::FishAudio => "fish_audio",
            TtsProvider::ElevenLabs => "elevenlabs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsrProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "deepgram")]
    Deepgram,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
}

impl AsrProvider {
    pub const ALL: [AsrProvider; 3] = [
        AsrProvider::OpenAi,
        AsrProvider::Deepgram,
        AsrProvider::ElevenLabs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AsrProvider::OpenAi => "openai",
            AsrProvider::Deepgram => "deepgram",
            AsrProvider::ElevenLabs => "elevenlabs",
        }
    }
}

fn parse_provider<P: Copy>(
    all: &[P],
    name: fn(P) -> &'static str,
    kind: &str,
    s: &str,
) -> Result<P, LinkError> {
    all.iter().copied().find(|p| name(*p) == s).ok_or_else(|| {
        let supported: Vec<&str> = all.iter().map(|p| name(*p)).collect();
        LinkError::Validation(format!(
            "unknown {kind} provider '{s}', supported: {}",
            supported.join(", ")
        ))
    })
}

impl FromStr for TtsProvider {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_provider(&Self::ALL, Self::as_str, "TTS", s)
    }
}

impl FromStr for AsrProvider {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_provider(&Self::ALL, Self::as_str, "ASR", s)
    }
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AsrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Text to speech
// ────────────────────────────────────────────────────────────────────────────

/// Per-request synthesis options.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsConfig {
    /// Provider voice; the provider default when empty.
    pub voice_id: String,
    pub model_id: Option<String>,
    /// Speech speed multiplier.
    pub speed: f64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            model_id: None,
            speed: 1.0,
        }
    }
}

/// One-shot text-to-speech synthesis.
pub trait TextToSpeech: Send {
    fn provider(&self) -> TtsProvider;

    /// Synthesize `text` and return the complete PCM buffer.
    ///
    /// # Errors
    ///
    /// [`LinkError::Hardware`] if the provider rejects the request.
    fn convert(&mut self, text: &str, config: &TtsConfig) -> Result<Vec<u8>, LinkError>;
}

/// Where synthesized speech is played.
pub trait AudioOutput: Send {
    /// Play `pcm` and block until playback finishes.
    fn play(&mut self, pcm: &[u8]) -> Result<(), LinkError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Speech to text
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AsrConfig {
    pub model_id: Option<String>,
    pub language: String,
    pub sample_rate: u32,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            model_id: None,
            language: "en".to_string(),
            sample_rate: PCM_SAMPLE_RATE,
        }
    }
}

/// A streaming recognition session.
pub trait SpeechToText: Send {
    fn provider(&self) -> AsrProvider;

    fn connect(&mut self, config: &AsrConfig) -> Result<(), LinkError>;

    fn send_audio(&mut self, chunk: &[u8]) -> Result<(), LinkError>;

    /// A finished transcript if one is ready.  Must not block.
    fn receive_transcript(&mut self) -> Result<Option<String>, LinkError>;

    fn close(&mut self) -> Result<(), LinkError>;
}

/// Audio capture device.
pub trait Microphone: Send {
    fn start(&mut self) -> Result<(), LinkError>;

    /// The next captured chunk, or `None` if nothing new is buffered.
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, LinkError>;

    fn stop(&mut self);
}

/// Stream the microphone into `stt` until a non-empty transcript arrives.
///
/// Returns an empty string when `timeout` passes without speech.  The
/// microphone is stopped and the session closed on every path.
///
/// # Errors
///
/// The first error from the session or the microphone.
pub fn transcribe(
    stt: &mut dyn SpeechToText,
    mic: &mut dyn Microphone,
    config: &AsrConfig,
    timeout: Duration,
) -> Result<String, LinkError> {
    stt.connect(config)?;
    let result = match mic.start() {
        Ok(()) => stream_until_transcript(stt, mic, timeout),
        Err(e) => Err(e),
    };
    mic.stop();
    let closed = stt.close();
    let transcript = result?;
    closed?;
    Ok(transcript)
}

fn stream_until_transcript(
    stt: &mut dyn SpeechToText,
    mic: &mut dyn Microphone,
    timeout: Duration,
) -> Result<String, LinkError> {
    info!(provider = %stt.provider(), "listening");
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match mic.read_chunk()? {
            Some(chunk) => stt.send_audio(&chunk)?,
            None => std::thread::sleep(IDLE_POLL),
        }
        if let Some(transcript) = stt.receive_transcript()?
            && !transcript.is_empty()
        {
            debug!(chars = transcript.len(), "transcript received");
            return Ok(transcript);
        }
    }
    warn!(timeout_s = timeout.as_secs_f64(), "no speech detected");
    Ok(String::new())
}
