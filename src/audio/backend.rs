use crate::config::RecorderConfig;
use crate::error::Result;

use super::queue::BufferSender;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of frames (samples per channel) in this buffer
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Real-time capture source feeding the buffer queue
///
/// Implementations copy every delivered hardware buffer and push it through
/// the [`BufferSender`]. The push must never block the delivery path, so
/// implementations never perform I/O or take locks inside their callback.
#[async_trait::async_trait]
pub trait CaptureSource: Send {
    /// Open the input stream described by `config` and start pushing buffers into `queue`
    ///
    /// Fails with `DeviceUnavailable` when the stream cannot be opened.
    async fn open(&mut self, config: &RecorderConfig, queue: BufferSender) -> Result<()>;

    /// Stop and release the stream
    ///
    /// Once this returns no further buffers are pushed. Closing an already
    /// closed source is a no-op.
    async fn close(&mut self);

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Take the most recent abnormal stream status, if any
    fn take_warning(&mut self) -> Option<String> {
        None
    }

    /// Get source name for logging
    fn name(&self) -> &str;
}
