//! Spreadsheet synchronizer
//!
//! Background task flushing the aggregator into the spreadsheet on a fixed
//! period, independent of request traffic. A failed tick is logged and the
//! loop carries on with the next one; only the stop flag ends the task.
//!
//! The stop flag is checked between ticks, so a write in progress always
//! completes. Shutdown wakes the sleeping loop and waits a bounded grace
//! period for it to exit.

use crate::aggregator::DetectionAggregator;
use crate::sheet::PestSheet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Reference flush period
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2);

/// How long shutdown waits for the loop to notice the stop flag
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Spreadsheet read/write failures
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read spreadsheet: {0}")]
    Read(#[from] calamine::XlsxError),

    #[error("Could not write spreadsheet: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("Sheet '{0}' not found")]
    MissingSheet(String),

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Sync task failed: {0}")]
    Join(String),
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Aggregator empty; nothing written
    NoRecords,
    /// Target document missing; nothing written
    NoDocument,
    Written {
        updated: usize,
        appended: usize,
        skipped: usize,
    },
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Spreadsheet document path
    pub path: PathBuf,
    pub interval: Duration,
    /// Append rows for labels missing from the document instead of skipping them
    pub append_missing_labels: bool,
    pub shutdown_grace: Duration,
}

impl SyncSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: DEFAULT_SYNC_INTERVAL,
            append_missing_labels: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Flushes aggregator state into the spreadsheet document
pub struct SpreadsheetSynchronizer {
    settings: SyncSettings,
    aggregator: Arc<DetectionAggregator>,
}

impl SpreadsheetSynchronizer {
    pub fn new(settings: SyncSettings, aggregator: Arc<DetectionAggregator>) -> Self {
        Self {
            settings,
            aggregator,
        }
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    /// Create the document seeded with the catalog if it does not exist.
    ///
    /// Returns true when a new document was written.
    pub async fn ensure_document(&self) -> Result<bool, SyncError> {
        let path = self.settings.path.clone();
        run_blocking(move || {
            if path.exists() {
                return Ok(false);
            }
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            PestSheet::seeded().write(&path)?;
            info!("Created spreadsheet {}", path.display());
            Ok(true)
        })
        .await
    }

    /// Seed the aggregator from rows of an existing document with counts.
    ///
    /// Returns the number of records seeded; a missing document seeds nothing.
    pub async fn seed_aggregator(&self) -> Result<usize, SyncError> {
        let path = self.settings.path.clone();
        let records = run_blocking(move || {
            if !path.exists() {
                return Ok(Vec::new());
            }
            Ok(PestSheet::read(&path)?.seed_records())
        })
        .await?;

        Ok(self.aggregator.seed(records).await)
    }

    /// One flush: only when the aggregator has records and the document exists
    pub async fn tick(&self) -> Result<TickOutcome, SyncError> {
        let records = self.aggregator.snapshot().await;
        if records.is_empty() {
            return Ok(TickOutcome::NoRecords);
        }

        let path = self.settings.path.clone();
        let append = self.settings.append_missing_labels;
        run_blocking(move || {
            if !path.exists() {
                return Ok(TickOutcome::NoDocument);
            }

            let mut sheet = PestSheet::read(&path)?;
            let stats = sheet.apply(&records, append);
            if stats.skipped > 0 {
                debug!(
                    "{} label(s) not in {} were skipped",
                    stats.skipped,
                    path.display()
                );
            }
            if stats.appended > 0 {
                info!("Appended {} new label row(s) to spreadsheet", stats.appended);
            }
            sheet.write(&path)?;

            Ok(TickOutcome::Written {
                updated: stats.updated,
                appended: stats.appended,
                skipped: stats.skipped,
            })
        })
        .await
    }

    /// Create the document if needed, then flush once
    pub async fn flush(&self) -> Result<TickOutcome, SyncError> {
        self.ensure_document().await?;
        self.tick().await
    }

    /// Start the periodic loop on the tokio runtime
    pub fn spawn(self) -> SyncHandle {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let ticks = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let grace = self.settings.shutdown_grace;

        let join = tokio::spawn({
            let stop_flag = Arc::clone(&stop_flag);
            let wake = Arc::clone(&wake);
            let ticks = Arc::clone(&ticks);
            let failures = Arc::clone(&failures);
            async move {
                info!(
                    "Spreadsheet sync started ({} every {:?})",
                    self.settings.path.display(),
                    self.settings.interval
                );
                self.sync_loop(&stop_flag, &wake, &ticks, &failures).await;
                info!("Spreadsheet sync stopped");
            }
        });

        SyncHandle {
            stop_flag,
            wake,
            ticks,
            failures,
            grace,
            join,
        }
    }

    async fn sync_loop(
        &self,
        stop_flag: &AtomicBool,
        wake: &Notify,
        ticks: &AtomicU64,
        failures: &AtomicU64,
    ) {
        while !stop_flag.load(Ordering::Acquire) {
            match self.tick().await {
                Ok(TickOutcome::Written {
                    updated, appended, ..
                }) => {
                    debug!("Spreadsheet synced: {} updated, {} appended", updated, appended);
                }
                Ok(TickOutcome::NoDocument) => {
                    debug!("Spreadsheet {} missing, tick skipped", self.settings.path.display());
                }
                Ok(TickOutcome::NoRecords) => {}
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!("Error updating spreadsheet: {}", e);
                }
            }
            ticks.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = wake.notified() => {}
            }
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Join(e.to_string()))?
}

/// Handle to a running synchronizer loop
pub struct SyncHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    ticks: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    grace: Duration,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Ticks completed so far, failed ones included
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks that ended in an error
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Set the stop flag and wait up to the grace period for the loop to exit.
    ///
    /// Returns true when the loop stopped in time.
    pub async fn shutdown(self) -> bool {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();

        match tokio::time::timeout(self.grace, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Spreadsheet sync task failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Spreadsheet sync did not stop within {:?}", self.grace);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectionBatch;

    fn synchronizer(path: PathBuf) -> (SpreadsheetSynchronizer, Arc<DetectionAggregator>) {
        let aggregator = Arc::new(DetectionAggregator::new());
        let mut settings = SyncSettings::new(path);
        settings.interval = Duration::from_millis(20);
        (
            SpreadsheetSynchronizer::new(settings, Arc::clone(&aggregator)),
            aggregator,
        )
    }

    fn aphids(count: u64) -> DetectionBatch {
        std::iter::once(("Aphid", count)).collect()
    }

    #[tokio::test]
    async fn test_ensure_document_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pests.xlsx");
        let (sync, _) = synchronizer(path.clone());

        assert!(sync.ensure_document().await.unwrap());
        assert!(!sync.ensure_document().await.unwrap());
        assert_eq!(PestSheet::read(&path).unwrap(), PestSheet::seeded());
    }

    #[tokio::test]
    async fn test_tick_without_records_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pests.xlsx");
        let (sync, _) = synchronizer(path.clone());

        assert_eq!(sync.tick().await.unwrap(), TickOutcome::NoRecords);
        assert!(!path.exists());

        sync.ensure_document().await.unwrap();
        let before = std::fs::read(&path).unwrap();
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::NoRecords);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_tick_without_document_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pests.xlsx");
        let (sync, aggregator) = synchronizer(path.clone());

        aggregator.merge(&aphids(1), None).await;
        assert_eq!(sync.tick().await.unwrap(), TickOutcome::NoDocument);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_tick_writes_cumulative_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pests.xlsx");
        let (sync, aggregator) = synchronizer(path.clone());
        sync.ensure_document().await.unwrap();

        aggregator.merge(&aphids(2), Some("Greenhouse")).await;
        aggregator.merge(&aphids(3), Some("Greenhouse")).await;

        let outcome = sync.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Written {
                updated: 1,
                appended: 0,
                skipped: 0
            }
        );

        let sheet = PestSheet::read(&path).unwrap();
        let row = sheet.row("Aphid").unwrap();
        assert_eq!(row.count, 5);
        assert_eq!(row.location, "Greenhouse");
        assert!(!row.last_updated.is_empty());
        assert_eq!(sheet.row("Beetle").unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_missing_label_append_policy() {
        let dir = tempfile::tempdir().unwrap();
        let locust: DetectionBatch = std::iter::once(("Locust", 2)).collect();

        let appending = dir.path().join("append.xlsx");
        let (sync, aggregator) = synchronizer(appending.clone());
        sync.ensure_document().await.unwrap();
        aggregator.merge(&locust, None).await;
        sync.tick().await.unwrap();
        assert_eq!(PestSheet::read(&appending).unwrap().row("Locust").unwrap().count, 2);

        let skipping = dir.path().join("skip.xlsx");
        let aggregator = Arc::new(DetectionAggregator::new());
        let mut settings = SyncSettings::new(skipping.clone());
        settings.append_missing_labels = false;
        let sync = SpreadsheetSynchronizer::new(settings, Arc::clone(&aggregator));
        sync.ensure_document().await.unwrap();
        aggregator.merge(&locust, None).await;

        assert_eq!(
            sync.tick().await.unwrap(),
            TickOutcome::Written {
                updated: 0,
                appended: 0,
                skipped: 1
            }
        );
        assert!(PestSheet::read(&skipping).unwrap().row("Locust").is_none());
    }

    #[tokio::test]
    async fn test_seed_aggregator_from_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pests.xlsx");

        let (first, aggregator) = synchronizer(path.clone());
        first.ensure_document().await.unwrap();
        aggregator.merge(&aphids(4), Some("Barn")).await;
        first.tick().await.unwrap();

        let (second, restarted) = synchronizer(path);
        assert_eq!(second.seed_aggregator().await.unwrap(), 1);
        let record = restarted.get("Aphid").await.unwrap();
        assert_eq!(record.count, 4);
        assert_eq!(record.location, "Barn");
    }

    #[tokio::test]
    async fn test_failed_ticks_do_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the document path exists but cannot be opened as a workbook
        let path = dir.path().join("locked.xlsx");
        std::fs::create_dir(&path).unwrap();

        let (sync, aggregator) = synchronizer(path);
        aggregator.merge(&aphids(1), None).await;
        assert!(sync.tick().await.is_err());

        let handle = sync.spawn();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handle.failures() < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(handle.failures() >= 3);
        assert!(!handle.is_finished());
        assert!(handle.shutdown().await);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = Arc::new(DetectionAggregator::new());
        let mut settings = SyncSettings::new(dir.path().join("pests.xlsx"));
        settings.interval = Duration::from_secs(3600);
        settings.shutdown_grace = Duration::from_millis(500);

        let handle = SpreadsheetSynchronizer::new(settings, aggregator).spawn();
        while handle.ticks() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.shutdown().await);
    }
}
