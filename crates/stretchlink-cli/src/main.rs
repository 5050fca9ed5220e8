//! `stretchlink` – robot driver and bus client tools.
//!
//! | Subcommand | Does |
//! |---|---|
//! | `run` | start the robot, serve status/command/servo/goto/speech/camera endpoints until Ctrl-C |
//! | `monitor` | print the status stream of a running driver |
//! | `goto` | send one blocking base move and print the reply |
//! | `say` | have the driver speak a line of text |
//! | `listen` | run one round of speech recognition and print the transcript |
//! | `config` | print the effective configuration as TOML |
//!
//! Configuration comes from `--config`, else `$STRETCHLINK_CONFIG`, else
//! defaults, followed by `STRETCHLINK_*` overrides.  `SKIP_VALIDATION=1`
//! disables schema invariant checks on decoded messages.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use stretchlink_driver::{
    CameraBinding, Peripherals, RobotController, SpeechInput, SpeechOutput, server, telemetry,
};
use stretchlink_hal::speech::{AsrConfig, TtsConfig};
use stretchlink_hal::{
    Camera, RobotHardware, SimAudioOutput, SimCamera, SimMicrophone, SimRobot, SimSpeechLog,
    SimSpeechToText, SimTextToSpeech,
};
use stretchlink_middleware::{GotoClient, ListenClient, SpeakClient, StatusSubscriber};
use stretchlink_types::{JointName, LinkError, Status, Twist2D, ValidationMode};
use tracing::{error, info, warn};

use crate::config::Config;

/// Remote driver for a Stretch mobile manipulator.
#[derive(Parser, Debug)]
#[command(name = "stretchlink", version, about, long_about = None)]
struct Cli {
    /// Config file (TOML).  Overrides `$STRETCHLINK_CONFIG`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the robot and serve every endpoint until Ctrl-C.
    Run {
        /// Drive the simulated robot and cameras.
        #[arg(long)]
        sim: bool,
    },
    /// Print status samples from a running driver.
    Monitor {
        #[arg(long, default_value = "ws://127.0.0.1:5555")]
        url: String,
        /// One JSON object per line instead of a summary.
        #[arg(long)]
        json: bool,
        /// Stop after this many samples.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Move the base by a distance or an angle and wait for completion.
    Goto {
        #[arg(long, default_value = "ws://127.0.0.1:5558")]
        url: String,
        /// Metres forward (negative for backward).
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        linear: f64,
        /// Radians counter-clockwise.
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        angular: f64,
    },
    /// Speak a line of text through the driver.
    Say {
        #[arg(long, default_value = "ws://127.0.0.1:6101")]
        url: String,
        text: String,
    },
    /// Listen for one utterance and print what was heard.
    Listen {
        #[arg(long, default_value = "ws://127.0.0.1:6102")]
        url: String,
    },
    /// Print the effective configuration.
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    let _guard = telemetry::init_tracing("stretchlink", cfg.debug);

    // The runtime is built after tracing so the simple OTLP exporter never
    // needs one.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Run { sim } => run_driver(&runtime, &cfg, sim || cfg.sim),
        Command::Monitor { url, json, count } => runtime.block_on(monitor(&url, json, count)),
        Command::Goto {
            url,
            linear,
            angular,
        } => runtime.block_on(goto(&url, Twist2D::new(linear, angular))),
        Command::Say { url, text } => runtime.block_on(say(&url, &text)),
        Command::Listen { url } => runtime.block_on(listen(&url)),
        Command::Config => cfg
            .to_toml_string()
            .map(|text| print!("{text}"))
            .map_err(|e| LinkError::Serialization(e.to_string())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run_driver(runtime: &tokio::runtime::Runtime, cfg: &Config, sim: bool) -> Result<(), LinkError> {
    let mode = ValidationMode::from_env();
    if !mode.is_strict() {
        warn!(
            var = ValidationMode::ENV_VAR,
            "schema validation disabled, decoded messages are trusted as-is"
        );
    }

    let hardware = hardware(sim)?;
    let controller = RobotController::start(hardware, cfg.controller_settings()?)?.into_shared();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the driver with SIGKILL");
    }

    let (speech_output, speech_input) = speech(cfg, sim)?;
    let peripherals = Peripherals {
        cameras: cameras(cfg, sim),
        speech_output,
        speech_input,
    };
    let running = runtime.block_on(server::serve(
        Arc::clone(&controller),
        &cfg.server_settings(mode)?,
        peripherals,
        Arc::clone(&shutdown),
    ))?;

    runtime.block_on(async {
        while !shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });
    info!("shutdown requested");
    running.stop();

    let mut controller = controller.lock();
    if let Err(e) = controller.stop() {
        error!(error = %e, "stop failed");
    }
    controller.shutdown()
}

/// The robot backend.  Only the simulator is built in; a vendor backend
/// implements [`RobotHardware`] in its own crate.
fn hardware(sim: bool) -> Result<Box<dyn RobotHardware>, LinkError> {
    if sim {
        info!("using simulated robot");
        return Ok(Box::new(SimRobot::new()));
    }
    Err(LinkError::Startup(
        "no hardware backend available; pass --sim or set sim = true".to_string(),
    ))
}

fn cameras(cfg: &Config, sim: bool) -> Vec<CameraBinding> {
    let mut bindings = Vec::new();
    for (name, camera) in cfg.camera_entries() {
        if !camera.enabled {
            continue;
        }
        let Some(port) = cfg.camera_port(name) else {
            continue;
        };
        if !sim {
            warn!(camera = name, "no capture backend available, camera disabled");
            continue;
        }
        let depth = name != "arducam";
        let source: Box<dyn Camera> = Box::new(SimCamera::new(
            name,
            camera.width,
            camera.height,
            camera.fps,
            depth,
        ));
        bindings.push(CameraBinding {
            camera: source,
            port,
        });
    }
    bindings
}

/// What the simulated microphone "hears" in `--sim` runs.
const SIM_TRANSCRIPT: &str = "hello robot";

/// Speech backends for the configured providers.  Only simulated providers
/// are built in.
fn speech(cfg: &Config, sim: bool) -> Result<(Option<SpeechOutput>, Option<SpeechInput>), LinkError> {
    let service = &cfg.service;
    if !sim {
        warn!(
            tts = %service.tts_provider,
            asr = %service.asr_provider,
            "no speech backend available, speech disabled"
        );
        return Ok((None, None));
    }
    let timeout = service
        .asr_timeout()
        .map_err(|e| LinkError::Startup(e.to_string()))?;
    info!(tts = %service.tts_provider, asr = %service.asr_provider, "using simulated speech");
    let log = SimSpeechLog::new();
    let output = SpeechOutput {
        tts: Box::new(SimTextToSpeech::new(service.tts_provider, log.clone())),
        audio: Box::new(SimAudioOutput::new(log.clone())),
        config: TtsConfig::default(),
    };
    let input = SpeechInput {
        stt: Box::new(SimSpeechToText::new(service.asr_provider, log, SIM_TRANSCRIPT, 25)),
        mic: Box::new(SimMicrophone::new()),
        config: AsrConfig::default(),
        timeout,
    };
    Ok((Some(output), Some(input)))
}

// ─────────────────────────────────────────────────────────────────────────────
// monitor / goto / say / listen
// ─────────────────────────────────────────────────────────────────────────────

async fn monitor(url: &str, json: bool, count: Option<usize>) -> Result<(), LinkError> {
    let mut subscriber = StatusSubscriber::connect(url, ValidationMode::from_env()).await?;
    info!(url, "monitoring status");
    let mut received = 0usize;
    while count.is_none_or(|n| received < n) {
        let Some((timestamp_ns, status)) = subscriber.next().await? else {
            info!("status stream closed");
            break;
        };
        received += 1;
        if json {
            let line = serde_json::to_string(&status)
                .map_err(|e| LinkError::Serialization(e.to_string()))?;
            println!("{line}");
        } else {
            println!("{}", summary(timestamp_ns, &status));
        }
    }
    Ok(())
}

fn summary(timestamp_ns: u64, status: &Status) -> String {
    let joint = |j: JointName| status.position(j).unwrap_or(f64::NAN);
    let mut flags = Vec::new();
    if status.runstop {
        flags.push("RUNSTOP".red().bold().to_string());
    }
    if status.is_low_voltage {
        flags.push("LOW VOLTAGE".yellow().to_string());
    }
    if status.is_charging {
        flags.push("charging".green().to_string());
    }
    format!(
        "{} base=({:+.3}, {:+.3}, {:+.3}) lift={:.3} arm={:.3} wrist=({:+.2}, {:+.2}, {:+.2}) gripper={:.1} {}",
        timestamp_ns.to_string().dimmed(),
        status.odometry.pose.x,
        status.odometry.pose.y,
        status.odometry.pose.theta,
        joint(JointName::Lift),
        joint(JointName::Arm),
        joint(JointName::WristYaw),
        joint(JointName::WristPitch),
        joint(JointName::WristRoll),
        joint(JointName::Gripper),
        flags.join(" "),
    )
}

async fn goto(url: &str, twist: Twist2D) -> Result<(), LinkError> {
    let mut client = GotoClient::connect(url).await?;
    let reply = client.goto(twist).await?;
    if reply == "ok" {
        println!("{}", reply.green());
        Ok(())
    } else {
        println!("{}", reply.red());
        Err(LinkError::Hardware {
            component: "base".to_string(),
            details: reply,
        })
    }
}

async fn say(url: &str, text: &str) -> Result<(), LinkError> {
    let mut client = SpeakClient::connect(url).await?;
    client.say(text).await?;
    info!(url, chars = text.len(), "text sent");
    Ok(())
}

async fn listen(url: &str) -> Result<(), LinkError> {
    let mut client = ListenClient::connect(url).await?;
    let transcript = client.listen().await?;
    if transcript.is_empty() {
        println!("{}", "(nothing heard)".dimmed());
    } else {
        println!("{transcript}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stretchlink_hal::speech::{SpeechToText, TextToSpeech};

    #[test]
    fn cli_parses_run_with_sim() {
        let cli = Cli::try_parse_from(["stretchlink", "--config", "/tmp/x.toml", "run", "--sim"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(cli.command, Command::Run { sim: true }));
    }

    #[test]
    fn cli_parses_negative_goto() {
        let cli = Cli::try_parse_from(["stretchlink", "goto", "--angular", "-1.5"]).expect("parse");
        match cli.command {
            Command::Goto { linear, angular, .. } => {
                assert_eq!(linear, 0.0);
                assert_eq!(angular, -1.5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn real_hardware_is_unavailable() {
        assert!(matches!(hardware(false), Err(LinkError::Startup(_))));
        assert!(hardware(true).is_ok());
    }

    #[test]
    fn only_enabled_cameras_are_bound_in_sim() {
        let mut cfg = Config::default();
        cfg.cameras.d405.enabled = true;
        cfg.cameras.arducam.enabled = true;
        let bindings = cameras(&cfg, true);
        let names: Vec<(&str, bool, u16)> = bindings
            .iter()
            .map(|b| (b.camera.name(), b.camera.has_depth(), b.port))
            .collect();
        assert_eq!(names, vec![("arducam", false, 6000), ("d405", true, 6002)]);
        assert!(cameras(&cfg, false).is_empty());
    }

    #[test]
    fn cli_parses_say_and_listen() {
        let cli = Cli::try_parse_from(["stretchlink", "say", "hello there"]).expect("parse");
        match cli.command {
            Command::Say { url, text } => {
                assert_eq!(url, "ws://127.0.0.1:6101");
                assert_eq!(text, "hello there");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        let cli = Cli::try_parse_from(["stretchlink", "listen", "--url", "ws://robot:6102"])
            .expect("parse");
        assert!(matches!(cli.command, Command::Listen { ref url } if url == "ws://robot:6102"));
    }

    #[test]
    fn speech_is_simulated_only_in_sim() {
        let cfg = Config::default();
        let (output, input) = speech(&cfg, true).expect("speech");
        let output = output.expect("speech output");
        assert_eq!(output.tts.provider(), cfg.service.tts_provider);
        let input = input.expect("speech input");
        assert_eq!(input.stt.provider(), cfg.service.asr_provider);
        assert_eq!(input.timeout, Duration::from_secs(10));

        let (output, input) = speech(&cfg, false).expect("speech");
        assert!(output.is_none() && input.is_none());
    }

    #[test]
    fn summary_flags_runstop() {
        let mut status = Status::default();
        status.runstop = true;
        let line = summary(42, &status);
        assert!(line.contains("RUNSTOP"));
        assert!(line.contains("lift=0.000"));
    }
}
