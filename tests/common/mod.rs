// Shared test fixtures: a scripted capture source standing in for hardware.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_recorder::{
    AudioFrame, BufferSender, CaptureSource, RecorderConfig, RecorderError, Result,
};

#[derive(Default)]
struct ScriptState {
    sender: Option<BufferSender>,
    fail_open: bool,
    opened: usize,
    closed: usize,
    delivered: usize,
}

/// Capture source driven by the test instead of an audio device
///
/// Clones share state, so a test keeps one handle to feed buffers while the
/// controller owns the other.
#[derive(Clone, Default)]
pub struct ScriptedCapture {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose device can never be opened
    pub fn unavailable() -> Self {
        let capture = Self::default();
        capture.state.lock().unwrap().fail_open = true;
        capture
    }

    /// Deliver a buffer as the hardware callback would; false when the stream is closed
    pub fn feed(&self, frame: AudioFrame) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(sender) = state.sender.as_ref() else {
            return false;
        };
        let pushed = sender.push(frame);
        if pushed {
            state.delivered += 1;
        }
        pushed
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().sender.is_some()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

#[async_trait::async_trait]
impl CaptureSource for ScriptedCapture {
    async fn open(&mut self, _config: &RecorderConfig, queue: BufferSender) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(RecorderError::DeviceUnavailable {
                reason: "scripted device is busy".to_string(),
                candidates: Vec::new(),
            });
        }
        state.sender = Some(queue);
        state.opened += 1;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.sender.take().is_some() {
            state.closed += 1;
        }
    }

    fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().sender.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Mono 16 kHz config with short chunks and a fast writer poll
pub fn test_config(
    root: &Path,
    chunk_seconds: u32,
    sample_rate: u32,
    channels: u16,
) -> RecorderConfig {
    let mut config = RecorderConfig::new(root.join("audio"), root.join("markers"));
    config.chunk_seconds = chunk_seconds;
    config.sample_rate = sample_rate;
    config.channels = channels;
    config.poll_interval = Duration::from_millis(20);
    config
}

/// A buffer whose samples count up from `start`, so ordering mistakes show up in comparisons
pub fn ramp(start: usize, len: usize, channels: u16) -> AudioFrame {
    AudioFrame {
        samples: (start..start + len).map(|i| (i % 30_000) as i16).collect(),
        channels,
        timestamp_ms: 0,
    }
}
