use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    /// Draining the queue and flushing markers; resolves to Idle
    Stopping,
    /// The chunk writer hit a fatal error; the next mark/stop reports it
    Failed,
}

/// One recording run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Sortable id, `%Y%m%d_%H%M%S` in local time
    pub id: String,
    pub started_at: DateTime<Local>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_seconds: u32,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub state: SessionState,

    /// The active session, if any
    pub session: Option<Session>,

    /// Seconds since the active session started
    pub duration_secs: f64,

    /// Markers dropped in the active session
    pub markers_count: usize,

    /// Samples waiting in the buffer queue
    pub queued_samples: usize,

    /// Largest backlog seen in the active session, in samples
    pub peak_queued_samples: usize,
}
