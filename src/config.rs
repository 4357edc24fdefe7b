use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{RecorderError, Result};

/// Environment variable prefix for overrides, e.g. `RECORDER__RECORDING__CHUNK_SECONDS=60`
pub const ENV_PREFIX: &str = "RECORDER";

/// Largest payload a WAV header can describe
const MAX_WAV_DATA_BYTES: u64 = u32::MAX as u64 - 44;

/// Configuration file as written on disk
#[derive(Debug, Deserialize)]
pub struct Config {
    pub recording: RecordingSection,
    pub paths: PathsSection,
}

#[derive(Debug, Deserialize)]
pub struct RecordingSection {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_seconds: u32,
    /// Input device index; the host default device when absent
    #[serde(default)]
    pub device: Option<usize>,
    #[serde(default = "default_queue_warn_seconds")]
    pub queue_warn_seconds: u32,
}

#[derive(Debug, Deserialize)]
pub struct PathsSection {
    pub audio_dir: String,
    pub markers_dir: String,
}

fn default_queue_warn_seconds() -> u32 {
    30
}

impl Config {
    /// Load from a file (format picked by extension) layered with `RECORDER__*` env overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                RecorderError::Configuration(format!("{}: {}", path.display(), e))
            })?;

        settings
            .try_deserialize()
            .map_err(|e| RecorderError::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// Build the recorder configuration, resolving relative paths against `base_dir`
    pub fn recorder_config(&self, base_dir: &Path) -> Result<RecorderConfig> {
        let config = RecorderConfig {
            sample_rate: self.recording.sample_rate,
            channels: self.recording.channels,
            chunk_seconds: self.recording.chunk_seconds,
            device: self.recording.device,
            audio_dir: resolve_dir(base_dir, &self.paths.audio_dir)?,
            markers_dir: resolve_dir(base_dir, &self.paths.markers_dir)?,
            queue_warn_seconds: self.recording.queue_warn_seconds,
            poll_interval: RecorderConfig::DEFAULT_POLL_INTERVAL,
        };
        config.validate()?;
        Ok(config)
    }
}

fn resolve_dir(base_dir: &Path, raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(RecorderError::Configuration(
            "output directory must not be empty".to_string(),
        ));
    }
    let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

/// Recorder configuration, immutable for the lifetime of a controller
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Duration of each chunk file
    pub chunk_seconds: u32,
    /// Input device index (None = host default)
    pub device: Option<usize>,
    /// Directory for `<session_id>_partNN.wav` files
    pub audio_dir: PathBuf,
    /// Directory for `markers_<session_id>.json` files
    pub markers_dir: PathBuf,
    /// Queue depth (seconds of audio) that triggers a backlog warning
    pub queue_warn_seconds: u32,
    /// Bounded wait of the writer on an empty queue
    pub poll_interval: Duration,
}

impl RecorderConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(audio_dir: impl Into<PathBuf>, markers_dir: impl Into<PathBuf>) -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_seconds: 300, // 5 minutes
            device: None,
            audio_dir: audio_dir.into(),
            markers_dir: markers_dir.into(),
            queue_warn_seconds: default_queue_warn_seconds(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Load a config file and resolve its paths relative to the file's directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Config::load(path)?.recorder_config(base_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1000..=384_000).contains(&self.sample_rate) {
            return Err(RecorderError::Configuration(format!(
                "sample_rate {} Hz is out of range (1000..=384000)",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels > 32 {
            return Err(RecorderError::Configuration(format!(
                "channels must be between 1 and 32, got {}",
                self.channels
            )));
        }
        if self.chunk_seconds == 0 {
            return Err(RecorderError::Configuration(
                "chunk_seconds must be at least 1".to_string(),
            ));
        }
        let chunk_bytes = self.chunk_frames() * self.channels as u64 * 2;
        if chunk_bytes > MAX_WAV_DATA_BYTES {
            return Err(RecorderError::Configuration(format!(
                "chunk_seconds {} is too long for a single WAV file at {} Hz x {} channels",
                self.chunk_seconds, self.sample_rate, self.channels
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(RecorderError::Configuration(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Frames per full chunk
    pub fn chunk_frames(&self) -> u64 {
        self.chunk_seconds as u64 * self.sample_rate as u64
    }

    /// Queue depth, in samples, at which the backlog alarm fires
    pub fn queue_warn_samples(&self) -> usize {
        self.queue_warn_seconds as usize * self.sample_rate as usize * self.channels as usize
    }

    /// Create the output directories if they do not exist yet
    pub fn ensure_output_dirs(&self) -> Result<()> {
        for dir in [&self.audio_dir, &self.markers_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                RecorderError::Configuration(format!(
                    "cannot create output directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        info!(
            "Output directories ready: audio={}, markers={}",
            self.audio_dir.display(),
            self.markers_dir.display()
        );

        Ok(())
    }
}
