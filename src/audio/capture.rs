//! Microphone capture through cpal
//!
//! `cpal::Stream` is not `Send`, so the stream is built, owned and dropped on
//! a dedicated thread. The source itself only keeps the handle used to shut
//! that thread down, which keeps it usable behind an async mutex.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::backend::{AudioFrame, CaptureSource};
use super::devices::{select_input_device, unavailable};
use super::queue::BufferSender;
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};

struct CaptureWorker {
    shutdown_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Hardware capture source backed by the default cpal host
pub struct CpalCapture {
    worker: Option<CaptureWorker>,
    /// Latest abnormal stream status, written by the error callback
    warning: Arc<Mutex<Option<String>>>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self {
            worker: None,
            warning: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureSource for CpalCapture {
    async fn open(&mut self, config: &RecorderConfig, queue: BufferSender) -> Result<()> {
        if self.worker.is_some() {
            warn!("Capture already open; reopening");
            self.close().await;
        }

        let (ready_tx, ready_rx) = oneshot::channel::<Result<String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let thread_config = config.clone();
        let warning = Arc::clone(&self.warning);

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let (stream, device_name) = match build_stream(&thread_config, queue, warning) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(device_name));

                // Parked until close(), or until the source is dropped
                let _ = shutdown_rx.recv();

                if let Err(e) = stream.pause() {
                    debug!("Failed to pause input stream: {}", e);
                }
                drop(stream);
            })
            .map_err(|e| RecorderError::DeviceUnavailable {
                reason: format!("failed to spawn capture thread: {}", e),
                candidates: Vec::new(),
            })?;

        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!(
                    device = %device_name,
                    sample_rate = config.sample_rate,
                    channels = config.channels,
                    "Audio capture started"
                );
                self.worker = Some(CaptureWorker {
                    shutdown_tx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(RecorderError::DeviceUnavailable {
                    reason: "capture thread exited before the stream opened".to_string(),
                    candidates: Vec::new(),
                })
            }
        }
    }

    async fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = worker.shutdown_tx.send(());
        match tokio::task::spawn_blocking(move || worker.thread.join()).await {
            Ok(Ok(())) => info!("Audio capture stopped"),
            Ok(Err(_)) => error!("Audio capture thread panicked"),
            Err(e) => error!("Failed to join audio capture thread: {}", e),
        }
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn take_warning(&mut self) -> Option<String> {
        self.warning.lock().ok().and_then(|mut slot| slot.take())
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// Open and start the input stream; runs on the capture thread
fn build_stream(
    config: &RecorderConfig,
    queue: BufferSender,
    warning: Arc<Mutex<Option<String>>>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = select_input_device(&host, config.device)?;
    let device_name = device.name().unwrap_or_else(|_| String::from("unknown"));

    let sample_format = pick_sample_format(&device, config)
        .ok_or_else(|| {
            unavailable(
                &host,
                format!(
                    "device '{}' does not support {} Hz x {} channels",
                    device_name, config.sample_rate, config.channels
                ),
            )
        })?;

    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = move |err: cpal::StreamError| {
        // Reported, but capture keeps going
        warn!("Input stream status: {}", err);
        if let Ok(mut slot) = warning.lock() {
            *slot = Some(err.to_string());
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => build_input::<i16>(&device, &stream_config, queue, |s| s, err_fn),
        SampleFormat::F32 => build_input::<f32>(&device, &stream_config, queue, f32_to_i16, err_fn),
        SampleFormat::U16 => build_input::<u16>(&device, &stream_config, queue, u16_to_i16, err_fn),
        other => {
            return Err(unavailable(
                &host,
                format!("unsupported sample format: {:?}", other),
            ))
        }
    }
    .map_err(|e| unavailable(&host, format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| unavailable(&host, format!("failed to start input stream: {}", e)))?;

    Ok((stream, device_name))
}

/// Sample format of a supported config matching the requested rate and channels
fn pick_sample_format(device: &cpal::Device, config: &RecorderConfig) -> Option<SampleFormat> {
    let rate = config.sample_rate;
    let formats: Vec<SampleFormat> = device
        .supported_input_configs()
        .ok()?
        .filter(|range| {
            range.channels() == config.channels
                && range.min_sample_rate().0 <= rate
                && range.max_sample_rate().0 >= rate
        })
        .map(|range| range.sample_format())
        .collect();

    [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16]
        .into_iter()
        .find(|preferred| formats.contains(preferred))
}

/// The data callback: copy, convert, enqueue. No I/O and no locks.
fn build_input<T: SizedSample + 'static>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    queue: BufferSender,
    convert: fn(T) -> i16,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = stream_config.channels;
    let sample_rate = stream_config.sample_rate.0 as u64;
    let mut frames_delivered: u64 = 0;

    device.build_input_stream(
        stream_config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let frame = AudioFrame {
                samples: data.iter().map(|&s| convert(s)).collect(),
                channels,
                timestamp_ms: frames_delivered * 1000 / sample_rate,
            };
            frames_delivered += frame.frame_count() as u64;
            queue.push(frame);
        },
        err_fn,
        None,
    )
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}
