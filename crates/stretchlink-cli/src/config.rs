//! Driver configuration – a TOML file plus `STRETCHLINK_*` overrides.
//!
//! Every field has a default, so an empty file (or none at all) is a valid
//! configuration.
//!
//! ```toml
//! sim = true
//!
//! [ports]
//! host = "0.0.0.0"
//! status = 5555
//!
//! [service]
//! status_rate_hz = 50.0
//! tts_provider = "fish_audio"
//! asr_provider = "deepgram"
//!
//! [cameras.d405]
//! enabled = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stretchlink_driver::{ControllerSettings, ServerSettings, services};
use stretchlink_hal::speech::{AsrProvider, TtsProvider};
use stretchlink_kinematics::{ChainDescription, IkPolicy};
use stretchlink_types::{LinkError, ValidationMode};
use thiserror::Error;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "STRETCHLINK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Sections
// ────────────────────────────────────────────────────────────────────────────

/// Listening ports.  Port `0` asks the OS for a free port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ports {
    pub host: String,
    pub status: u16,
    pub command: u16,
    pub servo: u16,
    pub goto: u16,
    pub tts: u16,
    pub asr: u16,
    pub arducam: u16,
    pub d435if: u16,
    pub d405: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            status: 5555,
            command: 5556,
            servo: 5557,
            goto: 5558,
            tts: 6101,
            asr: 6102,
            arducam: 6000,
            d435if: 6001,
            d405: 6002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub status_rate_hz: f64,
    /// Messages buffered per subscriber before the oldest are dropped.
    pub bus_capacity: usize,
    pub tts_provider: TtsProvider,
    pub asr_provider: AsrProvider,
    /// Longest a listen request waits for speech.
    pub asr_timeout_seconds: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            status_rate_hz: 50.0,
            bus_capacity: 16,
            tts_provider: TtsProvider::FishAudio,
            asr_provider: AsrProvider::Deepgram,
            asr_timeout_seconds: 10.0,
        }
    }
}

impl ServiceConfig {
    pub fn asr_timeout(&self) -> Result<Duration, ConfigError> {
        let secs = self.asr_timeout_seconds;
        if !(secs.is_finite() && secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "service.asr_timeout_seconds must be positive, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| ConfigError::Invalid(format!("service.asr_timeout_seconds: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub enabled: bool,
    /// Device path for V4L2 cameras, serial number for RealSense.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CameraConfig {
    fn sized(device: &str, width: u32, height: u32) -> Self {
        Self {
            enabled: false,
            device: device.to_string(),
            width,
            height,
            fps: 15,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::sized("", 640, 480)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CamerasConfig {
    pub arducam: CameraConfig,
    pub d435if: CameraConfig,
    pub d405: CameraConfig,
}

impl Default for CamerasConfig {
    fn default() -> Self {
        Self {
            arducam: CameraConfig::sized("/dev/video0", 640, 480),
            d435if: CameraConfig::sized("", 640, 480),
            d405: CameraConfig::sized("", 480, 270),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// TOML chain description.  The built-in Stretch chain when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_path: Option<PathBuf>,
    pub ee_frame: String,
    pub base_frame: String,
    pub ik: IkPolicy,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            chain_path: None,
            ee_frame: "link_grasp_center".to_string(),
            base_frame: "base_link".to_string(),
            ik: IkPolicy::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Config
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log at `debug` unless `RUST_LOG` says otherwise.
    #[serde(default)]
    pub debug: bool,
    /// Drive the simulated robot instead of real hardware.
    #[serde(default)]
    pub sim: bool,
    #[serde(default)]
    pub ports: Ports,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub cameras: CamerasConfig,
    #[serde(default)]
    pub kinematics: KinematicsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.service.status_rate_hz.is_finite() && self.service.status_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "service.status_rate_hz must be positive, got {}",
                self.service.status_rate_hz
            )));
        }
        if self.service.bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "service.bus_capacity must be at least 1".to_string(),
            ));
        }
        self.service.asr_timeout()?;
        for (name, camera) in self.camera_entries() {
            if camera.enabled && camera.fps == 0 {
                return Err(ConfigError::Invalid(format!("cameras.{name}.fps must be at least 1")));
            }
        }
        let ik = &self.kinematics.ik;
        if ik.max_iterations == 0 || ik.step <= 0.0 || ik.tolerance <= 0.0 || ik.damping < 0.0 {
            return Err(ConfigError::Invalid(format!("kinematics.ik is out of range: {ik:?}")));
        }
        Ok(())
    }

    /// `(name, config)` for each camera, in a fixed order.
    pub fn camera_entries(&self) -> [(&'static str, &CameraConfig); 3] {
        [
            ("arducam", &self.cameras.arducam),
            ("d435if", &self.cameras.d435if),
            ("d405", &self.cameras.d405),
        ]
    }

    pub fn camera_port(&self, name: &str) -> Option<u16> {
        match name {
            "arducam" => Some(self.ports.arducam),
            "d435if" => Some(self.ports.d435if),
            "d405" => Some(self.ports.d405),
            _ => None,
        }
    }

    /// Kinematic settings, loading the chain file if one is configured.
    ///
    /// # Errors
    ///
    /// [`LinkError::Startup`] if the chain file is missing or invalid.
    pub fn controller_settings(&self) -> Result<ControllerSettings, LinkError> {
        let chain = match &self.kinematics.chain_path {
            Some(path) => ChainDescription::load(path)
                .map_err(|e| LinkError::Startup(format!("kinematic chain: {e}")))?,
            None => ChainDescription::stretch(),
        };
        Ok(ControllerSettings {
            chain,
            ee_frame: self.kinematics.ee_frame.clone(),
            base_frame: self.kinematics.base_frame.clone(),
            ik: self.kinematics.ik,
        })
    }

    pub fn server_settings(&self, mode: ValidationMode) -> Result<ServerSettings, LinkError> {
        Ok(ServerSettings {
            host: self.ports.host.clone(),
            status_port: self.ports.status,
            command_port: self.ports.command,
            servo_port: self.ports.servo,
            goto_port: self.ports.goto,
            tts_port: self.ports.tts,
            asr_port: self.ports.asr,
            status_period: services::status_period(self.service.status_rate_hz)?,
            bus_capacity: self.service.bus_capacity,
            mode,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Load the configuration.
///
/// Reads `explicit` if given, else the file named by [`CONFIG_ENV`], else
/// starts from defaults.  Environment overrides are applied last.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let mut cfg = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => load_from(&path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the file at `path` without overrides or validation.
pub(crate) fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&raw)?)
}

/// Apply `STRETCHLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `STRETCHLINK_HOST` | `ports.host` |
/// | `STRETCHLINK_STATUS_RATE_HZ` | `service.status_rate_hz` |
/// | `STRETCHLINK_COMMAND_PORT` | `ports.command` |
/// | `STRETCHLINK_DEBUG` | `debug` (`1` or `true`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STRETCHLINK_HOST") {
        cfg.ports.host = v;
    }
    if let Ok(v) = std::env::var("STRETCHLINK_STATUS_RATE_HZ")
        && let Ok(rate) = v.parse::<f64>()
    {
        cfg.service.status_rate_hz = rate;
    }
    if let Ok(v) = std::env::var("STRETCHLINK_COMMAND_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.ports.command = port;
    }
    if let Ok(v) = std::env::var("STRETCHLINK_DEBUG") {
        cfg.debug = matches!(v.as_str(), "1" | "true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(text.as_bytes()).expect("write");
        file
    }

    #[test]
    fn defaults_match_the_documented_ports() {
        let cfg = Config::default();
        assert_eq!(cfg.ports.status, 5555);
        assert_eq!(cfg.ports.command, 5556);
        assert_eq!(cfg.ports.servo, 5557);
        assert_eq!(cfg.ports.goto, 5558);
        assert_eq!((cfg.ports.tts, cfg.ports.asr), (6101, 6102));
        assert_eq!(cfg.service.tts_provider, TtsProvider::FishAudio);
        assert_eq!(cfg.service.asr_provider, AsrProvider::Deepgram);
        assert_eq!(cfg.service.asr_timeout().expect("timeout"), Duration::from_secs(10));
        assert_eq!(cfg.camera_port("d405"), Some(6002));
        assert_eq!(cfg.service.status_rate_hz, 50.0);
        assert_eq!(cfg.kinematics.ee_frame, "link_grasp_center");
        assert!(!cfg.sim);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            sim = true

            [ports]
            status = 7000

            [cameras.d405]
            enabled = true
            fps = 30

            [service]
            tts_provider = "elevenlabs"
            asr_provider = "openai"
            asr_timeout_seconds = 2.5

            [kinematics.ik]
            max_iterations = 50
            "#,
        );
        let cfg = load_from(file.path()).expect("load");
        assert!(cfg.sim);
        assert_eq!(cfg.ports.status, 7000);
        assert_eq!(cfg.ports.command, 5556);
        assert!(cfg.cameras.d405.enabled);
        assert_eq!(cfg.cameras.d405.fps, 30);
        assert_eq!(cfg.cameras.d405.width, 480);
        assert!(!cfg.cameras.arducam.enabled);
        assert_eq!(cfg.kinematics.ik.max_iterations, 50);
        assert_eq!(cfg.kinematics.ik.tolerance, 1e-4);
        assert_eq!(cfg.service.tts_provider, TtsProvider::ElevenLabs);
        assert_eq!(cfg.service.asr_provider, AsrProvider::OpenAi);
        assert_eq!(cfg.service.asr_timeout().expect("timeout"), Duration::from_millis(2500));
        assert_eq!(cfg.service.status_rate_hz, 50.0);
    }

    #[test]
    fn unknown_speech_provider_is_a_parse_error() {
        let file = write_config("[service]\ntts_provider = \"espeak\"\n");
        assert!(matches!(load_from(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn roundtrip_default_config() {
        let cfg = Config::default();
        let file = write_config(&cfg.to_toml_string().expect("serialize"));
        assert_eq!(load_from(file.path()).expect("load"), cfg);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let file = write_config("[service\nstatus_rate_hz = ");
        assert!(matches!(load_from(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.service.status_rate_hz = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.service.bus_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.cameras.arducam.enabled = true;
        cfg.cameras.arducam.fps = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.service.asr_timeout_seconds = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_chain_file_is_a_startup_error() {
        let mut cfg = Config::default();
        cfg.kinematics.chain_path = Some(PathBuf::from("/nonexistent/chain.toml"));
        assert!(matches!(cfg.controller_settings(), Err(LinkError::Startup(_))));
    }

    #[test]
    fn chain_file_is_loaded() {
        let chain = ChainDescription::stretch();
        let file = write_config(&chain.to_toml_string().expect("serialize chain"));
        let mut cfg = Config::default();
        cfg.kinematics.chain_path = Some(file.path().to_path_buf());
        let settings = cfg.controller_settings().expect("settings");
        assert_eq!(settings.chain, chain);
    }

    #[test]
    fn server_settings_carry_ports_and_period() {
        let cfg = Config::default();
        let settings = cfg.server_settings(ValidationMode::Skip).expect("settings");
        assert_eq!(settings.command_port, 5556);
        assert_eq!((settings.tts_port, settings.asr_port), (6101, 6102));
        assert_eq!(settings.mode, ValidationMode::Skip);
        assert!((settings.status_period.as_secs_f64() - 0.02).abs() < 1e-9);
    }

    // Every override test touches a different variable, so they can run in
    // parallel.

    #[test]
    fn apply_env_overrides_changes_status_rate() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("STRETCHLINK_STATUS_RATE_HZ", "10") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.service.status_rate_hz, 10.0);
        unsafe { std::env::remove_var("STRETCHLINK_STATUS_RATE_HZ") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_port() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("STRETCHLINK_COMMAND_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ports.command, 5556);
        unsafe { std::env::set_var("STRETCHLINK_COMMAND_PORT", "7100") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ports.command, 7100);
        unsafe { std::env::remove_var("STRETCHLINK_COMMAND_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_debug() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("STRETCHLINK_DEBUG", "true") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.debug);
        unsafe { std::env::remove_var("STRETCHLINK_DEBUG") };
    }
}
