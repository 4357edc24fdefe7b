use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::markers::{Marker, MarkerLog};
use super::stats::{Session, SessionState, SessionStats};
use crate::audio::{
    buffer_queue, AudioChunkFile, CaptureSource, ChunkConfig, ChunkWriter, CpalCapture,
    QueueGauge,
};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};

type WriterHandle = JoinHandle<Result<Vec<AudioChunkFile>>>;

/// Everything that lives exactly as long as one recording session
struct ActiveSession {
    session: Session,
    markers: MarkerLog,
    started: Instant,
    /// Phase-1 stop signal for the writer
    stop: Arc<AtomicBool>,
    writer: WriterHandle,
    queue: QueueGauge,
}

struct Inner {
    source: Box<dyn CaptureSource>,
    active: Option<ActiveSession>,
    last_chunks: Vec<AudioChunkFile>,
}

/// Owns the capture source and at most one active session
///
/// All transitions go through one async mutex, so two concurrent `start()`
/// calls can never both succeed. The current state is also published on a
/// watch channel so observers do not contend for that mutex.
pub struct SessionController {
    config: RecorderConfig,
    inner: Mutex<Inner>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl SessionController {
    /// Controller capturing from the configured hardware device
    pub fn new(config: RecorderConfig) -> Result<Self> {
        Self::with_source(config, Box::new(CpalCapture::new()))
    }

    /// Controller capturing from `source`
    ///
    /// Validates the configuration and creates the output directories.
    pub fn with_source(config: RecorderConfig, source: Box<dyn CaptureSource>) -> Result<Self> {
        config.validate()?;
        config.ensure_output_dirs()?;

        let (state_tx, _) = watch::channel(SessionState::Idle);

        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                source,
                active: None,
                last_chunks: Vec::new(),
            }),
            state_tx: Arc::new(state_tx),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Start a new session
    ///
    /// Fails with `AlreadyRecording` while a session is live, leaving it
    /// untouched. A session whose writer already failed is torn down and its
    /// `IoFailure` returned; the next call starts normally. If the capture
    /// source cannot be opened the controller stays Idle and the caller may
    /// retry.
    pub async fn start(&self) -> Result<Session> {
        let mut inner = self.inner.lock().await;

        if let Some(active) = &inner.active {
            if !active.writer.is_finished() {
                warn!("Recording already in progress: {}", active.session.id);
                return Err(RecorderError::AlreadyRecording);
            }
            // The previous session died with its writer; report that failure once
            self.finish_session(&mut inner).await?;
        }

        let now = Local::now();
        let session = Session {
            id: self.next_session_id(now),
            started_at: now,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            chunk_seconds: self.config.chunk_seconds,
        };
        let started = Instant::now();

        info!("Starting recording session: {}", session.id);

        let writer = ChunkWriter::new(ChunkConfig::for_session(&self.config, &session.id))?;
        let (sender, receiver) = buffer_queue(self.config.queue_warn_samples());
        let queue = receiver.gauge();

        inner.source.open(&self.config, sender).await?;

        let stop = Arc::new(AtomicBool::new(false));
        let writer = self.spawn_writer(writer, receiver, Arc::clone(&stop));

        inner.active = Some(ActiveSession {
            session: session.clone(),
            markers: MarkerLog::starting_at(started),
            started,
            stop,
            writer,
            queue,
        });
        self.state_tx.send_replace(SessionState::Recording);

        info!(
            "Recording session started: {} via {} ({} Hz, {} ch, {}s chunks)",
            session.id,
            inner.source.name(),
            session.sample_rate,
            session.channels,
            session.chunk_seconds
        );

        Ok(session)
    }

    /// Drop a marker at the current offset into the session
    ///
    /// If the writer has already failed, the session is torn down and that
    /// failure is returned instead.
    pub async fn mark(&self, label: impl Into<String>) -> Result<Marker> {
        let mut inner = self.inner.lock().await;

        let Some(active) = inner.active.as_mut() else {
            return Err(RecorderError::NoActiveSession);
        };

        if active.writer.is_finished() {
            return match self.finish_session(&mut inner).await {
                Err(e) => Err(e),
                Ok(_) => Err(RecorderError::NoActiveSession),
            };
        }

        let marker = active.markers.mark(label);
        info!(
            "Marker at {:.2}s in {}: {}",
            marker.timestamp, active.session.id, marker.label
        );

        Ok(marker)
    }

    /// Stop the session and return the path of its marker file
    ///
    /// Waits for every buffer captured before the stream closed to be
    /// written; there is no timeout.
    pub async fn stop(&self) -> Result<PathBuf> {
        self.stop_with_chunks().await.map(|(markers_path, _)| markers_path)
    }

    /// Like [`stop`](Self::stop), also returning the chunks sealed by this session
    pub async fn stop_with_chunks(&self) -> Result<(PathBuf, Vec<AudioChunkFile>)> {
        let mut inner = self.inner.lock().await;

        if inner.active.is_none() {
            warn!("Recording not active");
            return Err(RecorderError::NoActiveSession);
        }

        self.finish_session(&mut inner).await
    }

    /// The active session, if any
    pub async fn current_session(&self) -> Option<Session> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|active| active.session.clone())
    }

    /// Chunks sealed by the most recently stopped session
    pub async fn last_chunks(&self) -> Vec<AudioChunkFile> {
        self.inner.lock().await.last_chunks.clone()
    }

    /// Most recent abnormal stream status reported by the capture source
    pub async fn take_warning(&self) -> Option<String> {
        self.inner.lock().await.source.take_warning()
    }

    pub async fn stats(&self) -> SessionStats {
        let inner = self.inner.lock().await;
        let state = self.state();

        match &inner.active {
            Some(active) => SessionStats {
                state,
                session: Some(active.session.clone()),
                duration_secs: active.started.elapsed().as_secs_f64(),
                markers_count: active.markers.len(),
                queued_samples: active.queue.depth(),
                peak_queued_samples: active.queue.peak(),
            },
            None => SessionStats {
                state,
                session: None,
                duration_secs: 0.0,
                markers_count: 0,
                queued_samples: 0,
                peak_queued_samples: 0,
            },
        }
    }

    fn spawn_writer(
        &self,
        writer: ChunkWriter,
        receiver: crate::audio::BufferReceiver,
        stop: Arc<AtomicBool>,
    ) -> WriterHandle {
        let poll_interval = self.config.poll_interval;
        let state_tx = Arc::clone(&self.state_tx);

        tokio::spawn(async move {
            let result = writer.run(receiver, stop, poll_interval).await;
            if result.is_err() {
                state_tx.send_replace(SessionState::Failed);
            }
            result
        })
    }

    /// Two-phase shutdown of the active session, then marker flush
    async fn finish_session(
        &self,
        inner: &mut Inner,
    ) -> Result<(PathBuf, Vec<AudioChunkFile>)> {
        let Some(active) = inner.active.take() else {
            return Err(RecorderError::NoActiveSession);
        };
        let session_id = active.session.id.clone();

        info!("Stopping recording session: {}", session_id);
        self.state_tx.send_replace(SessionState::Stopping);

        // Phase 1: no new buffers once the stream is closed
        inner.source.close().await;
        active.stop.store(true, Ordering::SeqCst);

        // Phase 2: the writer drains what was already queued and seals the last chunk
        let written = match active.writer.await {
            Ok(result) => result,
            Err(e) => {
                error!("Chunk writer task panicked: {}", e);
                Err(RecorderError::io(
                    &self.config.audio_dir,
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                ))
            }
        };

        let markers = active.markers.persist(&self.config.markers_dir, &session_id);
        self.state_tx.send_replace(SessionState::Idle);

        match written {
            Ok(chunks) => {
                info!(
                    "Recording session complete: {} ({} chunks, {} markers)",
                    session_id,
                    chunks.len(),
                    active.markers.len()
                );
                inner.last_chunks = chunks.clone();
                markers.map(|markers_path| (markers_path, chunks))
            }
            Err(e) => {
                if let Err(marker_err) = markers {
                    error!(
                        "Markers of failed session {} were not saved: {}",
                        session_id, marker_err
                    );
                }
                inner.last_chunks.clear();
                Err(e)
            }
        }
    }

    /// Timestamp id, suffixed when artifacts from the same second already exist
    fn next_session_id(&self, now: DateTime<Local>) -> String {
        let base = now.format("%Y%m%d_%H%M%S").to_string();

        let mut id = base.clone();
        let mut suffix = 2;
        while self.session_artifacts_exist(&id) {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        id
    }

    fn session_artifacts_exist(&self, id: &str) -> bool {
        MarkerLog::file_path(&self.config.markers_dir, id).exists()
            || ChunkConfig::for_session(&self.config, id)
                .chunk_path(1)
                .exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferSender;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct NullSource;

    #[async_trait::async_trait]
    impl CaptureSource for NullSource {
        async fn open(&mut self, _config: &RecorderConfig, _queue: BufferSender) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) {}

        fn is_capturing(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "null"
        }
    }

    fn controller(temp_dir: &TempDir) -> SessionController {
        let config = RecorderConfig::new(
            temp_dir.path().join("audio"),
            temp_dir.path().join("markers"),
        );
        SessionController::with_source(config, Box::new(NullSource)).unwrap()
    }

    #[test]
    fn test_session_id_is_sortable_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let now = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();

        assert_eq!(controller.next_session_id(now), "20250307_090501");
    }

    #[test]
    fn test_session_id_avoids_existing_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let now = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();

        std::fs::write(
            temp_dir.path().join("markers/markers_20250307_090501.json"),
            "[]",
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("audio/20250307_090501_2_part01.wav"), b"").unwrap();

        let id = controller.next_session_id(now);
        assert_eq!(id, "20250307_090501_3");
        assert!(id.as_str() > "20250307_090501");
        assert!(id.as_str() < "20250307_090502");
    }

    #[test]
    fn test_new_controller_is_idle_and_creates_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);

        assert_eq!(controller.state(), SessionState::Idle);
        assert!(temp_dir.path().join("audio").is_dir());
        assert!(temp_dir.path().join("markers").is_dir());
    }
}
