pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use audio::{
    buffer_queue, list_input_devices, list_session_chunks, AudioChunkFile, AudioFile, AudioFrame,
    BufferReceiver, BufferSender, CaptureSource, ChunkConfig, ChunkWriter, CpalCapture,
    InputDeviceInfo,
};
pub use config::{Config, RecorderConfig};
pub use error::{RecorderError, Result};
pub use http::{create_router, AppState};
pub use session::{Marker, MarkerLog, Session, SessionController, SessionState, SessionStats};
