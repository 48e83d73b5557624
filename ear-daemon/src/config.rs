//! Configuration for the listening daemon
//!
//! Loaded once at startup from TOML. Every field has a built-in default, so a
//! missing file or section only produces a warning. Provider credentials may
//! also come from the environment, which overrides the file.
//!
//! ```toml
//! root_folder = "/var/lib/ear"
//!
//! [audio]
//! sample_rate = 48000
//! use_monitor_source = true
//!
//! [recognition]
//! cooldown_secs = 10
//! audd_api_token = "..."
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variables that override credentials from the TOML file
pub const AUDD_TOKEN_ENV: &str = "AUDD_API_TOKEN";
pub const SHAZAM_KEY_ENV: &str = "SHAZAM_API_KEY";
pub const GENIUS_TOKEN_ENV: &str = "GENIUS_API_TOKEN";

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EarConfig {
    /// Folder holding `logs/` (event logs, feedback history, heartbeat)
    pub root_folder: Option<PathBuf>,
    pub audio: AudioConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
    pub supervisor: SupervisorConfig,
    pub recognition: RecognitionConfig,
    pub lyrics: LyricsConfig,
    pub logging: LoggingConfig,
}

/// Capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// 44100 or 48000
    pub sample_rate: u32,
    /// Channels requested from the device; always downmixed to mono
    pub channels: u16,
    /// Size of one capture block
    pub block_ms: u32,
    /// Ring buffer length
    pub buffer_seconds: u32,
    /// Input device name (None = default input)
    pub device: Option<String>,
    /// Prefer a pipewire/pulse monitor source to capture system audio
    pub use_monitor_source: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            block_ms: 100,
            buffer_seconds: 30,
            device: None,
            use_monitor_source: false,
        }
    }
}

impl AudioConfig {
    /// Samples per capture block
    pub fn block_samples(&self) -> usize {
        (self.sample_rate as u64 * self.block_ms as u64 / 1000) as usize
    }
}

/// Feature extraction constants.
///
/// The onset constants (window, overlap, threshold, scale) are empirical.
/// Changing them changes the reported BPM.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Length of the analysed window (the "last N seconds")
    pub window_seconds: f64,
    /// Peak amplitude below which a window counts as silence
    pub silence_threshold: f32,
    pub bass_weight: f64,
    pub mid_weight: f64,
    pub high_weight: f64,
    /// Magnitude multiplier for bass bins before the dominant-frequency argmax
    pub dominant_bass_boost: f64,
    /// Band used for onset energy
    pub onset_low_hz: f64,
    pub onset_high_hz: f64,
    pub onset_window_ms: f64,
    /// Fraction of the onset window shared by consecutive windows
    pub onset_overlap: f64,
    /// Onsets must exceed mean + k * stddev of the onset sequence
    pub onset_threshold_stddevs: f64,
    /// Onset rate to BPM scaling
    pub bpm_scale: f64,
    pub max_bpm: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_seconds: 5.0,
            silence_threshold: 0.001,
            bass_weight: 4.0,
            mid_weight: 1.0,
            high_weight: 0.5,
            dominant_bass_boost: 2.0,
            onset_low_hz: 20.0,
            onset_high_hz: 200.0,
            onset_window_ms: 50.0,
            onset_overlap: 0.5,
            onset_threshold_stddevs: 1.0,
            bpm_scale: 0.5,
            max_bpm: 200.0,
        }
    }
}

/// Periodic tick settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tick_ms: u64,
    pub heartbeat_ms: u64,
    /// Treat a feedback suggestion as the tick's recognition result and skip
    /// the external providers
    pub adopt_feedback_suggestions: bool,
    /// In-process event bus capacity
    pub event_bus_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 2000,
            heartbeat_ms: 5000,
            adopt_feedback_suggestions: false,
            event_bus_capacity: 256,
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

/// Reconnect policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Consecutive device failures before the cooldown
    pub max_failures: u32,
    /// Fixed pause once `max_failures` is reached (not exponential)
    pub failure_cooldown_secs: u64,
    /// Consecutive persistence failures before a critical_error event
    pub persistence_failure_threshold: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_failures: 10,
            failure_cooldown_secs: 30,
            persistence_failure_threshold: 5,
        }
    }
}

impl SupervisorConfig {
    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }
}

/// Recognition provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Minimum time between external recognition attempts
    pub cooldown_secs: u64,
    /// Per-provider call timeout
    pub timeout_secs: u64,
    pub audd_api_token: Option<String>,
    pub shazam_api_key: Option<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 10,
            timeout_secs: 15,
            audd_api_token: None,
            shazam_api_key: None,
        }
    }
}

impl RecognitionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Lyric provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    pub timeout_secs: u64,
    pub genius_api_token: Option<String>,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            genius_api_token: None,
        }
    }
}

impl LyricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing EnvFilter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ear_daemon=info,ear_common=info".to_string(),
        }
    }
}

impl EarConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    ///
    /// A file that exists but does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                ear_common::config::load_toml::<EarConfig>(path)?
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                EarConfig::default()
            }
            None => {
                info!("No config file, using defaults");
                EarConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EarConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Credentials from the environment override those from the file
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = non_empty_env(AUDD_TOKEN_ENV) {
            self.recognition.audd_api_token = Some(token);
        }
        if let Some(key) = non_empty_env(SHAZAM_KEY_ENV) {
            self.recognition.shazam_api_key = Some(key);
        }
        if let Some(token) = non_empty_env(GENIUS_TOKEN_ENV) {
            self.lyrics.genius_api_token = Some(token);
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be > 0".to_string()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("audio.channels must be > 0".to_string()));
        }
        if self.audio.block_samples() == 0 {
            return Err(Error::Config("audio.block_ms too small for sample rate".to_string()));
        }
        if !(self.analysis.window_seconds > 0.0) {
            return Err(Error::Config("analysis.window_seconds must be > 0".to_string()));
        }
        if f64::from(self.audio.buffer_seconds) < self.analysis.window_seconds {
            return Err(Error::Config(format!(
                "audio.buffer_seconds ({}) must cover analysis.window_seconds ({})",
                self.audio.buffer_seconds, self.analysis.window_seconds
            )));
        }
        if !(0.0..1.0).contains(&self.analysis.onset_overlap) {
            return Err(Error::Config("analysis.onset_overlap must be in [0, 1)".to_string()));
        }
        if self.pipeline.tick_ms == 0 || self.pipeline.heartbeat_ms == 0 {
            return Err(Error::Config("pipeline intervals must be > 0".to_string()));
        }
        if self.pipeline.event_bus_capacity == 0 {
            return Err(Error::Config("pipeline.event_bus_capacity must be > 0".to_string()));
        }
        if self.supervisor.max_failures == 0 {
            return Err(Error::Config("supervisor.max_failures must be > 0".to_string()));
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Locations of the persisted files under the root folder
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub log_dir: PathBuf,
    /// Append-only correction history
    pub feedback_file: PathBuf,
    /// Heartbeat record, overwritten in place
    pub state_file: PathBuf,
    /// Event log for this process run
    pub event_log: PathBuf,
}

impl DataPaths {
    /// Paths for a run started at `started`; the event log name embeds the
    /// start time to the millisecond so each process start gets a fresh file.
    pub fn new(root: &Path, started: chrono::DateTime<chrono::Utc>) -> Self {
        let log_dir = root.join("logs");
        Self {
            feedback_file: log_dir.join("feedback_history.jsonl"),
            state_file: log_dir.join("ear_state.json"),
            event_log: log_dir.join(format!("ear_{}.jsonl", started.format("%Y%m%d_%H%M%S_%3f"))),
            log_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}
