use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::queue::{BufferReceiver, Popped};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};

/// Chunk configuration
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Session ID (used for chunk filenames)
    pub session_id: String,
    /// Output directory for chunks
    pub output_dir: PathBuf,
    /// Duration of each chunk in seconds (default: 300 = 5 minutes)
    pub chunk_seconds: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl ChunkConfig {
    pub fn new(session_id: String, output_dir: PathBuf) -> Self {
        Self {
            session_id,
            output_dir,
            chunk_seconds: 300, // 5 minutes default
            sample_rate: 16000,
            channels: 1,
        }
    }

    pub fn for_session(config: &RecorderConfig, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            output_dir: config.audio_dir.clone(),
            chunk_seconds: config.chunk_seconds,
            sample_rate: config.sample_rate,
            channels: config.channels,
        }
    }

    /// Reject settings that would give empty chunks or zero-width frames
    pub fn validate(&self) -> Result<()> {
        if self.chunk_seconds == 0 || self.sample_rate == 0 || self.channels == 0 {
            return Err(RecorderError::Configuration(format!(
                "chunk of {}s at {} Hz x {} channels holds no frames",
                self.chunk_seconds, self.sample_rate, self.channels
            )));
        }
        Ok(())
    }

    /// Frames that fit in one full chunk
    pub fn capacity_frames(&self) -> u64 {
        self.chunk_seconds as u64 * self.sample_rate as u64
    }

    /// `<session_id>_part<NN>.wav`
    pub fn chunk_path(&self, sequence_index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_part{:02}.wav", self.session_id, sequence_index))
    }
}

/// A chunk file written for a session
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunkFile {
    pub session_id: String,
    /// 1-based, gap-free within a session
    pub sequence_index: usize,
    pub path: PathBuf,
    /// Frames (samples per channel) in this chunk
    pub frame_count: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunkFile {
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }
}

/// Persists a session's sample stream into fixed-duration WAV chunks
///
/// Buffers are split at exact frame boundaries, so every sample lands in
/// exactly one chunk regardless of how the capture side sized its buffers.
/// A chunk is sealed as soon as it is full; the next one is opened when the
/// next sample arrives.
pub struct ChunkWriter {
    config: ChunkConfig,
    current_chunk: Option<OpenChunk>,
    sequence_index: usize,
    sealed: Vec<AudioChunkFile>,
}

impl ChunkWriter {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;

        // Create output directory if it doesn't exist
        fs::create_dir_all(&config.output_dir)
            .map_err(|e| RecorderError::io(&config.output_dir, e))?;

        info!(
            "Chunk writer initialized: {} (chunks: {}s each)",
            config.session_id, config.chunk_seconds
        );

        Ok(Self {
            config,
            current_chunk: None,
            sequence_index: 0,
            sealed: Vec::new(),
        })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunks sealed so far
    pub fn sealed(&self) -> &[AudioChunkFile] {
        &self.sealed
    }

    /// Write interleaved samples, rolling over to new chunk files as needed
    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        let channels = self.config.channels as usize;
        if samples.len() % channels != 0 {
            let path = self.pending_path();
            return Err(RecorderError::io(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "buffer of {} samples is not a whole number of {}-channel frames",
                        samples.len(),
                        channels
                    ),
                ),
            ));
        }

        let capacity = self.config.capacity_frames();
        let mut rest = samples;

        while !rest.is_empty() {
            let mut chunk = match self.current_chunk.take() {
                Some(chunk) => chunk,
                None => self.start_new_chunk()?,
            };

            let room = (capacity - chunk.metadata.frame_count) as usize;
            let take = room.min(rest.len() / channels) * channels;
            let (head, tail) = rest.split_at(take);

            // On failure the chunk is dropped here and left on disk as-is
            chunk.write_samples(head)?;
            rest = tail;

            if chunk.metadata.frame_count >= capacity {
                self.seal(chunk)?;
            } else {
                self.current_chunk = Some(chunk);
            }
        }

        Ok(())
    }

    /// Seal the final (possibly partial) chunk and return every sealed chunk
    pub fn finish(mut self) -> Result<Vec<AudioChunkFile>> {
        if let Some(chunk) = self.current_chunk.take() {
            self.seal(chunk)?;
        }

        info!(
            "Chunked recording complete: {} chunks saved",
            self.sealed.len()
        );

        Ok(std::mem::take(&mut self.sealed))
    }

    /// Drain `queue` into chunk files until stopped
    ///
    /// Once `stop` is set the remaining queued buffers are written without
    /// waiting, then the final chunk is sealed. A buffer write in progress
    /// always completes before the stop flag is looked at. Any write error
    /// ends the loop: the queue is closed so producers stop feeding it, and
    /// the error is returned.
    pub async fn run(
        mut self,
        mut queue: BufferReceiver,
        stop: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Result<Vec<AudioChunkFile>> {
        info!("Starting chunked recording: {}", self.config.session_id);

        loop {
            let popped = if stop.load(Ordering::SeqCst) {
                match queue.try_pop() {
                    Popped::Frame(frame) => Popped::Frame(frame),
                    Popped::Empty | Popped::Closed => break,
                }
            } else {
                queue.pop_timeout(poll_interval).await
            };

            match popped {
                Popped::Frame(frame) => {
                    if let Err(e) = self.write(&frame.samples) {
                        error!(
                            "Chunk writer failed, aborting session {}: {}",
                            self.config.session_id, e
                        );
                        queue.close();
                        return Err(e);
                    }
                }
                Popped::Empty => continue,
                Popped::Closed => break,
            }
        }

        let peak = queue.peak();
        let chunks = self.finish()?;
        info!(
            "Chunk writer drained: {} chunks, peak backlog {} samples",
            chunks.len(),
            peak
        );

        Ok(chunks)
    }

    fn pending_path(&self) -> PathBuf {
        match &self.current_chunk {
            Some(chunk) => chunk.metadata.path.clone(),
            None => self.config.chunk_path(self.sequence_index + 1),
        }
    }

    fn start_new_chunk(&mut self) -> Result<OpenChunk> {
        let sequence_index = self.sequence_index + 1;
        let chunk = OpenChunk::create(
            self.config.chunk_path(sequence_index),
            &self.config.session_id,
            sequence_index,
            self.config.sample_rate,
            self.config.channels,
        )?;

        self.sequence_index = sequence_index;
        debug!("Opened chunk {}", chunk.metadata.path.display());

        Ok(chunk)
    }

    fn seal(&mut self, chunk: OpenChunk) -> Result<()> {
        let metadata = chunk.finish()?;
        info!(
            "Chunk {} complete: {:.1}s ({} frames)",
            metadata.sequence_index,
            metadata.duration_secs(),
            metadata.frame_count
        );
        self.sealed.push(metadata);
        Ok(())
    }
}

/// A session's chunk files on disk, in sequence order
pub fn list_session_chunks(audio_dir: &Path, session_id: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}_part", session_id);
    let entries = fs::read_dir(audio_dir).map_err(|e| RecorderError::io(audio_dir, e))?;

    let mut chunks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RecorderError::io(audio_dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        let index = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".wav"))
            .and_then(|digits| digits.parse::<usize>().ok());
        if let Some(index) = index {
            chunks.push((index, entry.path()));
        }
    }

    chunks.sort_by_key(|(index, _)| *index);
    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}

/// Writes a single chunk to disk as WAV file
struct OpenChunk {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: AudioChunkFile,
}

impl OpenChunk {
    fn create(
        path: PathBuf,
        session_id: &str,
        sequence_index: usize,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer =
            hound::WavWriter::create(&path, spec).map_err(|e| RecorderError::wav(&path, e))?;

        Ok(Self {
            writer: Some(writer),
            metadata: AudioChunkFile {
                session_id: session_id.to_string(),
                sequence_index,
                path,
                frame_count: 0,
                sample_rate,
                channels,
            },
        })
    }

    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| RecorderError::wav(&self.metadata.path, e))?;
            }

            self.metadata.frame_count += (samples.len() / self.metadata.channels as usize) as u64;
        }

        Ok(())
    }

    /// Flush, patch the WAV header and close the file
    fn finish(mut self) -> Result<AudioChunkFile> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| RecorderError::wav(&self.metadata.path, e))?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for OpenChunk {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!(
                    "Failed to finalize partial chunk {} on drop: {}",
                    self.metadata.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer_in(dir: &Path, chunk_seconds: u32, sample_rate: u32, channels: u16) -> ChunkWriter {
        let config = ChunkConfig {
            session_id: "unit".to_string(),
            output_dir: dir.to_path_buf(),
            chunk_seconds,
            sample_rate,
            channels,
        };
        ChunkWriter::new(config).unwrap()
    }

    #[test]
    fn test_chunk_path_is_zero_padded() {
        let config = ChunkConfig::new("20250101_090000".to_string(), PathBuf::from("/rec"));

        assert_eq!(
            config.chunk_path(3),
            PathBuf::from("/rec/20250101_090000_part03.wav")
        );
        assert_eq!(
            config.chunk_path(120),
            PathBuf::from("/rec/20250101_090000_part120.wav")
        );
    }

    #[test]
    fn test_new_rejects_empty_chunk_geometry() {
        let temp_dir = TempDir::new().unwrap();
        for (chunk_seconds, sample_rate, channels) in [(0, 16000, 1), (1, 0, 1), (1, 16000, 0)] {
            let config = ChunkConfig {
                session_id: "bad".to_string(),
                output_dir: temp_dir.path().to_path_buf(),
                chunk_seconds,
                sample_rate,
                channels,
            };

            let result = ChunkWriter::new(config);
            assert!(matches!(result, Err(RecorderError::Configuration(_))));
        }
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_buffer_spanning_several_boundaries() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer_in(temp_dir.path(), 1, 1000, 1);

        writer.write(&vec![7i16; 3500]).unwrap();
        assert_eq!(writer.sealed().len(), 3, "three full chunks sealed immediately");

        let chunks = writer.finish().unwrap();
        let frames: Vec<u64> = chunks.iter().map(|c| c.frame_count).collect();
        assert_eq!(frames, vec![1000, 1000, 1000, 500]);
        let indices: Vec<usize> = chunks.iter().map(|c| c.sequence_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_exact_multiple_leaves_no_empty_trailing_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer_in(temp_dir.path(), 1, 1000, 2);

        writer.write(&vec![1i16; 2 * 2000]).unwrap();
        let chunks = writer.finish().unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(!temp_dir.path().join("unit_part03.wav").exists());
    }

    #[test]
    fn test_partial_frame_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer_in(temp_dir.path(), 1, 1000, 2);

        let result = writer.write(&[1, 2, 3]);
        assert!(matches!(result, Err(RecorderError::IoFailure { .. })));
    }

    #[test]
    fn test_empty_writer_produces_no_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer_in(temp_dir.path(), 1, 1000, 1);

        let chunks = writer.finish().unwrap();
        assert!(chunks.is_empty());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_list_session_chunks_orders_numerically() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "s1_part10.wav",
            "s1_part02.wav",
            "s1_part100.wav",
            "s1_part01.wav",
            "s1_2_part01.wav",
            "markers_s1.json",
        ] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let chunks = list_session_chunks(temp_dir.path(), "s1").unwrap();
        let names: Vec<String> = chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec!["s1_part01.wav", "s1_part02.wav", "s1_part10.wav", "s1_part100.wav"]
        );
    }
}
