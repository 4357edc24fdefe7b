use std::path::PathBuf;

use thiserror::Error;

use crate::audio::InputDeviceInfo;

/// Errors surfaced by the recording pipeline
///
/// Capture and writer faults are reported once, as a single terminal error of
/// the session they belong to.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Audio input device unavailable: {reason}")]
    DeviceUnavailable {
        reason: String,
        /// Input devices that were present when the open failed
        candidates: Vec<InputDeviceInfo>,
    },

    #[error("A recording session is already in progress")]
    AlreadyRecording,

    #[error("No recording session is in progress")]
    NoActiveSession,

    #[error("Failed to write audio chunk {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist markers to {}: {source}", path.display())]
    MarkerPersistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecorderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Map a hound error onto `IoFailure`, keeping the underlying I/O error when there is one
    pub(crate) fn wav(path: impl Into<PathBuf>, err: hound::Error) -> Self {
        let source = match err {
            hound::Error::IoError(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        };
        Self::io(path, source)
    }

    /// Candidate input devices, if this error carries any
    pub fn candidates(&self) -> &[InputDeviceInfo] {
        match self {
            RecorderError::DeviceUnavailable { candidates, .. } => candidates,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failure_names_the_chunk() {
        let err = RecorderError::io(
            "/tmp/rec/20250101_090000_part03.wav",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );

        let msg = err.to_string();
        assert!(msg.contains("20250101_090000_part03.wav"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn device_unavailable_keeps_candidates() {
        let err = RecorderError::DeviceUnavailable {
            reason: "device index 7 out of range".to_string(),
            candidates: vec![InputDeviceInfo {
                index: 0,
                name: "Built-in Microphone".to_string(),
                channels: 1,
            }],
        };

        assert_eq!(err.candidates().len(), 1);
        assert_eq!(err.candidates()[0].name, "Built-in Microphone");
        assert!(RecorderError::NoActiveSession.candidates().is_empty());
    }
}
