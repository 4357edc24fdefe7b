pub mod backend;
pub mod capture;
pub mod chunk;
pub mod devices;
pub mod file;
pub mod queue;

pub use backend::{AudioFrame, CaptureSource};
pub use capture::CpalCapture;
pub use chunk::{list_session_chunks, AudioChunkFile, ChunkConfig, ChunkWriter};
pub use devices::{list_input_devices, InputDeviceInfo};
pub use file::AudioFile;
pub use queue::{buffer_queue, BufferReceiver, BufferSender, Popped, QueueGauge};
