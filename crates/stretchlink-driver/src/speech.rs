//! Speech services: spoken output and on-demand recognition.
//!
//! | Service | Endpoint | Request | Reply |
//! |---|---|---|---|
//! | speak | subscriber | text | none |
//! | listen | reply | any text, conventionally `listen` | transcript, `""` on failure |
//!
//! Synthesis, playback and recognition block, so each request runs on the
//! blocking pool.  Requests are handled one at a time per service.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stretchlink_hal::speech::{
    AsrConfig, AudioOutput, Microphone, SpeechToText, TextToSpeech, TtsConfig, transcribe,
};
use stretchlink_middleware::Subscription;
use stretchlink_types::LinkError;
use tracing::{debug, error, info};

/// Text-to-speech provider plus the device it plays on.
pub struct SpeechOutput {
    pub tts: Box<dyn TextToSpeech>,
    pub audio: Box<dyn AudioOutput>,
    pub config: TtsConfig,
}

impl SpeechOutput {
    /// Synthesize `text` and play it to completion.
    pub fn speak(&mut self, text: &str) -> Result<(), LinkError> {
        let pcm = self.tts.convert(text, &self.config)?;
        debug!(bytes = pcm.len(), "playing synthesized speech");
        self.audio.play(&pcm)
    }
}

/// Recognition provider plus the microphone it listens on.
pub struct SpeechInput {
    pub stt: Box<dyn SpeechToText>,
    pub mic: Box<dyn Microphone>,
    pub config: AsrConfig,
    pub timeout: Duration,
}

impl SpeechInput {
    /// One recognition round; `""` when nothing was said before the
    /// timeout.
    pub fn listen(&mut self) -> Result<String, LinkError> {
        transcribe(
            self.stt.as_mut(),
            self.mic.as_mut(),
            &self.config,
            self.timeout,
        )
    }
}

pub type SharedSpeechInput = Arc<Mutex<SpeechInput>>;

fn join_error(e: tokio::task::JoinError) -> LinkError {
    LinkError::Hardware {
        component: "speech".to_string(),
        details: e.to_string(),
    }
}

/// Speak every message received on `subscription` until the bus closes.
///
/// The first frame of each message is the text.  Blank text is skipped.
/// Failures are logged and the service keeps running.
pub async fn run_speak_service(output: SpeechOutput, mut subscription: Subscription) {
    info!(provider = %output.tts.provider(), "speak service started");
    let output = Arc::new(Mutex::new(output));
    while let Some(frames) = subscription.recv().await {
        let Some(first) = frames.first() else { continue };
        let text = String::from_utf8_lossy(first).trim().to_string();
        if text.is_empty() {
            debug!("ignoring blank speak request");
            continue;
        }
        info!(chars = text.len(), "speaking");
        let output = Arc::clone(&output);
        let result = tokio::task::spawn_blocking(move || output.lock().speak(&text))
            .await
            .map_err(join_error)
            .and_then(|r| r);
        if let Err(e) = result {
            error!(error = %e, "speak failed");
        }
    }
    info!("speak service stopped");
}

/// Answer one listen request with the transcript.
///
/// Any failure is logged and answered with an empty string, the same reply
/// as hearing nothing.
pub async fn handle_listen_request(input: SharedSpeechInput, request: Vec<u8>) -> String {
    debug!(request = %String::from_utf8_lossy(&request), "listen request");
    let result = tokio::task::spawn_blocking(move || input.lock().listen())
        .await
        .map_err(join_error)
        .and_then(|r| r);
    match result {
        Ok(transcript) => {
            info!(chars = transcript.len(), "listen completed");
            transcript
        }
        Err(e) => {
            error!(error = %e, "listen failed");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stretchlink_hal::speech::{AsrProvider, TtsProvider};
    use stretchlink_hal::{
        SimAudioOutput, SimMicrophone, SimSpeechLog, SimSpeechToText, SimTextToSpeech,
    };
    use stretchlink_middleware::MessageBus;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn output(tts: SimTextToSpeech, log: &SimSpeechLog) -> SpeechOutput {
        SpeechOutput {
            tts: Box::new(tts),
            audio: Box::new(SimAudioOutput::new(log.clone())),
            config: TtsConfig::default(),
        }
    }

    fn input(transcript: &str, log: &SimSpeechLog, timeout: Duration) -> SharedSpeechInput {
        Arc::new(Mutex::new(SpeechInput {
            stt: Box::new(SimSpeechToText::new(
                AsrProvider::Deepgram,
                log.clone(),
                transcript,
                2,
            )),
            mic: Box::new(SimMicrophone::new()),
            config: AsrConfig::default(),
            timeout,
        }))
    }

    async fn wait_for_played(log: &SimSpeechLog, count: usize) -> TestResult {
        tokio::time::timeout(Duration::from_secs(2), async {
            while log.played().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn speak_service_plays_text_and_skips_blanks() -> TestResult {
        let log = SimSpeechLog::new();
        let bus = MessageBus::new(16);
        let subscription = bus.subscribe_all();
        let task = tokio::spawn(run_speak_service(
            output(SimTextToSpeech::new(TtsProvider::FishAudio, log.clone()), &log),
            subscription,
        ));

        bus.publish(vec![b"   ".to_vec()]);
        bus.publish(vec![b" hello robot ".to_vec()]);
        wait_for_played(&log, 1).await?;

        assert_eq!(log.spoken(), vec!["hello robot".to_string()]);
        assert_eq!(log.played().len(), 1);
        task.abort();
        Ok(())
    }

    #[tokio::test]
    async fn speak_service_survives_provider_errors() -> TestResult {
        let log = SimSpeechLog::new();
        let bus = MessageBus::new(16);
        let subscription = bus.subscribe_all();
        let task = tokio::spawn(run_speak_service(
            output(
                SimTextToSpeech::new(TtsProvider::ElevenLabs, log.clone()).failing(),
                &log,
            ),
            subscription,
        ));

        bus.publish(vec![b"first".to_vec()]);
        bus.publish(vec![b"second".to_vec()]);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!task.is_finished());
        assert!(log.played().is_empty());
        task.abort();
        Ok(())
    }

    #[tokio::test]
    async fn listen_returns_the_transcript() {
        let log = SimSpeechLog::new();
        let shared = input("lower the arm", &log, Duration::from_secs(5));
        let reply = handle_listen_request(Arc::clone(&shared), b"listen".to_vec()).await;
        assert_eq!(reply, "lower the arm");

        let again = handle_listen_request(shared, b"listen".to_vec()).await;
        assert_eq!(again, "lower the arm");
        assert_eq!(log.sessions(), 2);
    }

    #[tokio::test]
    async fn listen_replies_empty_on_silence() {
        let log = SimSpeechLog::new();
        let shared = input("", &log, Duration::from_millis(80));
        assert_eq!(handle_listen_request(shared, b"listen".to_vec()).await, "");
    }

    struct DeadMic;

    impl Microphone for DeadMic {
        fn start(&mut self) -> Result<(), LinkError> {
            Err(LinkError::Hardware {
                component: "microphone".to_string(),
                details: "unplugged".to_string(),
            })
        }

        fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
            Ok(None)
        }

        fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn listen_replies_empty_on_error() {
        let log = SimSpeechLog::new();
        let shared = Arc::new(Mutex::new(SpeechInput {
            stt: Box::new(SimSpeechToText::new(
                AsrProvider::OpenAi,
                log.clone(),
                "never heard",
                0,
            )),
            mic: Box::new(DeadMic),
            config: AsrConfig::default(),
            timeout: Duration::from_secs(1),
        }));
        assert_eq!(handle_listen_request(shared, b"listen".to_vec()).await, "");
        assert_eq!(log.sessions(), 1);
    }
}
