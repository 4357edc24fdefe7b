//! Buffer queue between the real-time capture callback and the chunk writer
//!
//! The queue is unbounded: a push never blocks and never fails while the
//! writer is alive. Memory growth from a stalled disk is watched instead of
//! bounded: the consumer side logs a warning once the backlog crosses the
//! configured high-water mark, and re-arms the alarm once it falls back below
//! half of it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::backend::AudioFrame;

#[derive(Debug)]
struct QueueStats {
    /// Samples currently enqueued
    depth: AtomicUsize,
    /// Highest depth observed by the consumer
    peak: AtomicUsize,
    alarmed: AtomicBool,
    warn_samples: usize,
}

/// Create a connected producer/consumer pair
///
/// `warn_samples` is the backlog, in samples, that raises the high-water
/// alarm; zero disables it.
pub fn buffer_queue(warn_samples: usize) -> (BufferSender, BufferReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(QueueStats {
        depth: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        alarmed: AtomicBool::new(false),
        warn_samples,
    });

    (
        BufferSender {
            tx,
            stats: Arc::clone(&stats),
        },
        BufferReceiver { rx, stats },
    )
}

/// Producer half, owned by the capture callback
#[derive(Debug, Clone)]
pub struct BufferSender {
    tx: mpsc::UnboundedSender<AudioFrame>,
    stats: Arc<QueueStats>,
}

impl BufferSender {
    /// Enqueue a buffer without blocking
    ///
    /// Only atomics and the channel push happen here, so it is safe to call
    /// from a real-time callback. Returns `false` once the consumer is gone.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let len = frame.samples.len();
        // Counted before the send so the consumer never observes an underflow
        self.stats.depth.fetch_add(len, Ordering::SeqCst);

        if self.tx.send(frame).is_err() {
            self.stats.depth.fetch_sub(len, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Whether the consumer has stopped accepting buffers
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Backlog observer for status reporting
#[derive(Debug, Clone)]
pub struct QueueGauge {
    stats: Arc<QueueStats>,
}

impl QueueGauge {
    pub fn depth(&self) -> usize {
        self.stats.depth.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }
}

/// Result of a pop attempt
#[derive(Debug, PartialEq)]
pub enum Popped {
    Frame(AudioFrame),
    /// Nothing arrived (yet); producers are still connected
    Empty,
    /// Every producer is gone and the queue is drained
    Closed,
}

/// Consumer half, owned by the chunk writer
#[derive(Debug)]
pub struct BufferReceiver {
    rx: mpsc::UnboundedReceiver<AudioFrame>,
    stats: Arc<QueueStats>,
}

impl BufferReceiver {
    /// Wait at most `wait` for the next buffer
    pub async fn pop_timeout(&mut self, wait: Duration) -> Popped {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(frame)) => {
                self.account(&frame);
                Popped::Frame(frame)
            }
            Ok(None) => Popped::Closed,
            Err(_) => Popped::Empty,
        }
    }

    /// Take the next buffer if one is already queued
    pub fn try_pop(&mut self) -> Popped {
        match self.rx.try_recv() {
            Ok(frame) => {
                self.account(&frame);
                Popped::Frame(frame)
            }
            Err(mpsc::error::TryRecvError::Empty) => Popped::Empty,
            Err(mpsc::error::TryRecvError::Disconnected) => Popped::Closed,
        }
    }

    /// Refuse further pushes; buffers already queued can still be popped
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Samples currently queued
    pub fn depth(&self) -> usize {
        self.stats.depth.load(Ordering::SeqCst)
    }

    /// Highest backlog seen so far, in samples
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Read-only view of the backlog that outlives the receiver's move into the writer
    pub fn gauge(&self) -> QueueGauge {
        QueueGauge {
            stats: Arc::clone(&self.stats),
        }
    }

    fn account(&self, frame: &AudioFrame) {
        let depth = self
            .stats
            .depth
            .fetch_sub(frame.samples.len(), Ordering::SeqCst);
        self.stats.peak.fetch_max(depth, Ordering::SeqCst);

        let warn_at = self.stats.warn_samples;
        if warn_at == 0 {
            return;
        }
        if depth >= warn_at {
            if !self.stats.alarmed.swap(true, Ordering::SeqCst) {
                warn!(
                    depth_samples = depth,
                    threshold_samples = warn_at,
                    "Audio buffer backlog above high-water mark; disk is falling behind"
                );
            }
        } else if depth < warn_at / 2 && self.stats.alarmed.swap(false, Ordering::SeqCst) {
            info!(depth_samples = depth, "Audio buffer backlog recovered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_depth_tracks_push_and_pop() {
        let (tx, mut rx) = buffer_queue(0);

        assert!(tx.push(frame(vec![0; 100])));
        assert!(tx.push(frame(vec![0; 50])));
        assert_eq!(rx.depth(), 150);

        assert!(matches!(rx.try_pop(), Popped::Frame(_)));
        assert_eq!(rx.depth(), 50);
        assert_eq!(rx.peak(), 150);

        assert!(matches!(rx.try_pop(), Popped::Frame(_)));
        assert_eq!(rx.depth(), 0);
        assert_eq!(rx.try_pop(), Popped::Empty);
    }

    #[tokio::test]
    async fn test_push_after_close_is_rejected_and_not_counted() {
        let (tx, mut rx) = buffer_queue(0);
        rx.close();

        assert!(tx.is_closed());
        assert!(!tx.push(frame(vec![1, 2, 3])));
        assert_eq!(rx.depth(), 0);
    }

    #[tokio::test]
    async fn test_alarm_rearms_below_half_mark() {
        let (tx, mut rx) = buffer_queue(100);

        for _ in 0..4 {
            tx.push(frame(vec![0; 40]));
        }
        // depth 160 >= 100 raises the alarm
        rx.try_pop();
        assert!(rx.stats.alarmed.load(Ordering::SeqCst));

        rx.try_pop(); // 120
        rx.try_pop(); // 80
        assert!(rx.stats.alarmed.load(Ordering::SeqCst));
        rx.try_pop(); // 40 < 50 re-arms
        assert!(!rx.stats.alarmed.load(Ordering::SeqCst));
    }
}
