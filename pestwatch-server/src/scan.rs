//! Offline frame scanning
//!
//! Runs the model over image files, merges every Nth frame and flushes the
//! totals once at the end. Counts already in the document are loaded first,
//! so repeated scans add to them.

use crate::aggregator::DetectionAggregator;
use crate::detector::PestModel;
use crate::error::{Error, Result};
use crate::sync::{SpreadsheetSynchronizer, SyncSettings, TickOutcome};
use crate::validation::{decode_image, has_allowed_extension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Default frame stride (every 10th frame)
pub const DEFAULT_STRIDE: u64 = 10;

/// Expand directories into their image files, sorted by name
pub fn collect_frames(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            entries.sort();
            frames.extend(entries);
        } else if path.is_file() {
            frames.push(path.clone());
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No such file or directory: {}", path.display()),
            )));
        }
    }

    Ok(frames)
}

fn is_image_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(has_allowed_extension)
        .unwrap_or(false)
}

/// Summary of one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Records loaded from the document before scanning
    pub seeded: usize,
    /// Frames that went through the model
    pub processed: usize,
    /// Processed frames the model or decoder rejected
    pub failed: usize,
    pub outcome: TickOutcome,
}

/// One scan session over a set of frames
pub struct FrameScanner {
    model: Arc<PestModel>,
    aggregator: Arc<DetectionAggregator>,
    synchronizer: SpreadsheetSynchronizer,
    stride: u64,
    location: Option<String>,
}

impl FrameScanner {
    /// Scanner writing to `settings.path`; unknown labels are always appended
    pub fn new(model: Arc<PestModel>, mut settings: SyncSettings) -> Self {
        settings.append_missing_labels = true;
        let aggregator = Arc::new(DetectionAggregator::new());
        Self {
            model,
            synchronizer: SpreadsheetSynchronizer::new(settings, Arc::clone(&aggregator)),
            aggregator,
            stride: DEFAULT_STRIDE,
            location: None,
        }
    }

    pub fn with_stride(mut self, stride: u64) -> Self {
        self.stride = stride.max(1);
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn aggregator(&self) -> &Arc<DetectionAggregator> {
        &self.aggregator
    }

    /// Seed from the document, scan every Nth frame, then flush once.
    ///
    /// A document that exists but cannot be read aborts the scan before any
    /// frame is processed.
    pub async fn run(&self, frames: &[PathBuf]) -> Result<ScanReport> {
        self.synchronizer.ensure_document().await?;
        let seeded = self.synchronizer.seed_aggregator().await?;
        if seeded > 0 {
            info!("Continuing from {} pest record(s) in spreadsheet", seeded);
        }

        let mut processed = 0;
        let mut failed = 0;

        for (index, frame) in frames.iter().enumerate() {
            if index as u64 % self.stride != 0 {
                continue;
            }
            processed += 1;

            let bytes = match std::fs::read(frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping {}: {}", frame.display(), e);
                    failed += 1;
                    continue;
                }
            };

            let model = Arc::clone(&self.model);
            let result = tokio::task::spawn_blocking(move || {
                let image = decode_image(&bytes)?;
                model.detect(&image)
            })
            .await
            .map_err(|e| Error::Inference(format!("detection task failed: {}", e)))?;

            match result {
                Ok(batch) if batch.is_empty() => {
                    info!("Frame {} ({}): no pests", index, frame.display());
                }
                Ok(batch) => {
                    let summary: Vec<String> = batch
                        .iter()
                        .map(|(label, count)| format!("{}={}", label, count))
                        .collect();
                    info!(
                        "Frame {} ({}): {}",
                        index,
                        frame.display(),
                        summary.join(", ")
                    );
                    self.aggregator
                        .merge(&batch, self.location.as_deref())
                        .await;
                }
                Err(e) => {
                    warn!("Frame {} ({}): {}", index, frame.display(), e);
                    failed += 1;
                }
            }
        }

        let outcome = self.synchronizer.tick().await?;

        Ok(ScanReport {
            seeded,
            processed,
            failed,
            outcome,
        })
    }
}
