use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RecorderError, Result};

/// A label anchored to an offset from session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Seconds since the session started
    pub timestamp: f64,
    pub label: String,
}

/// Append-only marker list of one session
#[derive(Debug)]
pub struct MarkerLog {
    started: Instant,
    markers: Vec<Marker>,
}

impl MarkerLog {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            markers: Vec::new(),
        }
    }

    /// Append a marker at the current elapsed time
    pub fn mark(&mut self, label: impl Into<String>) -> Marker {
        let elapsed = self.started.elapsed().as_secs_f64();
        // Instant is monotonic; the max only guards against float rounding
        let last = self.markers.last().map_or(0.0, |m| m.timestamp);

        let marker = Marker {
            timestamp: elapsed.max(last),
            label: label.into(),
        };
        self.markers.push(marker.clone());
        marker
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// `markers_<session_id>.json`
    pub fn file_path(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("markers_{}.json", session_id))
    }

    /// Write the whole list as one JSON array; an empty log writes `[]`
    pub fn persist(&self, dir: &Path, session_id: &str) -> Result<PathBuf> {
        let path = Self::file_path(dir, session_id);
        let to_error = |source: std::io::Error| RecorderError::MarkerPersistence {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(to_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.markers)
            .map_err(|e| to_error(e.into()))?;
        writer.write_all(b"\n").map_err(to_error)?;
        writer
            .into_inner()
            .map_err(|e| to_error(e.into_error()))?
            .sync_all()
            .map_err(to_error)?;

        info!(
            "Saved {} markers to {}",
            self.markers.len(),
            path.display()
        );

        Ok(path)
    }
}

impl Default for MarkerLog {
    fn default() -> Self {
        Self::new()
    }
}
