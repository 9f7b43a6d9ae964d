use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::Character;

/// Client configuration
///
/// Loaded from an optional TOML file layered with `LOQA_DUPLEX__*`
/// environment overrides, e.g. `LOQA_DUPLEX__SESSION__NATS_URL`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionSettings,
    pub audio: AudioConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub health: HealthConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub character: Character,
    pub nats_url: String,
    pub subject_prefix: String,
    /// Wait between `connect()` and the first liveness check
    pub settle_delay_ms: u64,
    /// Connection monitor cadence
    pub poll_interval_ms: u64,
    /// Upper bound on the session-open handshake
    pub open_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            character: Character::Maya,
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "voice".to_string(),
            settle_delay_ms: 2000,
            poll_interval_ms: 10_000,
            open_timeout_ms: 5000,
        }
    }
}

impl SessionSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// WAV files in, WAV files out
    File,
    /// Live devices through cpal
    Microphone,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: BackendKind,
    pub input_rate: u32,
    pub default_playback_rate: u32,
    /// Samples per captured frame
    pub frame_size: usize,
    /// Watchdog period for recycling both streams
    pub reset_interval_secs: u64,
    /// Pause between closing and reopening a stream during a gentle reset
    pub reset_pause_ms: u64,
    /// Capture source for the file backend; silence when unset
    pub input_wav: Option<PathBuf>,
    /// Playback sink directory for the file backend
    pub output_dir: PathBuf,
    /// Print the console level meter while speaking
    pub show_meter: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            input_rate: 16000,
            default_playback_rate: 16000,
            frame_size: 1024,
            reset_interval_secs: 180,
            reset_pause_ms: 100,
            input_wav: None,
            output_dir: PathBuf::from("playback"),
            show_meter: true,
        }
    }
}

impl AudioConfig {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }

    pub fn reset_pause(&self) -> Duration {
        Duration::from_millis(self.reset_pause_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// RMS level above which a frame counts as speech
    pub energy_threshold: f64,
    pub level_history: usize,
    pub heartbeat_interval_secs: u64,
    pub idle_after_secs: u64,
    pub read_retry_ms: u64,
    pub send_backoff_ms: u64,
    pub idle_wait_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 500.0,
            level_history: 5,
            heartbeat_interval_secs: 5,
            idle_after_secs: 10,
            read_retry_ms: 100,
            send_backoff_ms: 500,
            idle_wait_ms: 2000,
        }
    }
}

impl CaptureConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }

    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }

    pub fn send_backoff(&self) -> Duration {
        Duration::from_millis(self.send_backoff_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub receive_timeout_ms: u64,
    /// Consecutive empty polls that end a speaking turn
    pub silence_polls: u32,
    pub idle_wait_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 10,
            silence_polls: 100,
            idle_wait_ms: 2000,
        }
    }
}

impl PlaybackConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
    pub report_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 15,
            report_interval_secs: 60,
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: PathBuf::from("token.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_logging: true,
        }
    }
}

impl Config {
    /// Load from `path` (extension optional, file may be absent) plus env overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LOQA_DUPLEX").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
