//! Detection aggregator
//!
//! Process-wide table of cumulative pest counts, owned by the application
//! state and shared by `Arc` between request handlers and the spreadsheet
//! synchronizer.
//!
//! Counts only ever grow. Each merge overwrites the record's timestamp and
//! location with the latest values; nothing decrements or resets a count
//! short of a restart.

use crate::detector::DetectionBatch;
use chrono::NaiveDateTime;
use pestwatch_common::{time, DEFAULT_LOCATION};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&time::format_timestamp(ts))
}

/// Cumulative detections of one pest label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PestRecord {
    pub label: String,
    pub count: u64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub last_updated: NaiveDateTime,
    pub location: String,
}

/// Lock-guarded label -> record table
///
/// A merge holds the write lock for the whole batch, so concurrent merges
/// never lose updates and the synchronizer never sees a half-applied batch.
#[derive(Debug, Default)]
pub struct DetectionAggregator {
    records: RwLock<HashMap<String, PestRecord>>,
}

/// Empty or blank locations fall back to the default location
fn effective_location(location: Option<&str>) -> &str {
    match location {
        Some(l) if !l.trim().is_empty() => l.trim(),
        _ => DEFAULT_LOCATION,
    }
}

impl DetectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a detection batch stamped with the current local time.
    ///
    /// Returns the number of labels touched.
    pub async fn merge(&self, batch: &DetectionBatch, location: Option<&str>) -> usize {
        self.merge_at(batch, location, time::now_local()).await
    }

    /// Merge a detection batch with an explicit timestamp
    pub async fn merge_at(
        &self,
        batch: &DetectionBatch,
        location: Option<&str>,
        now: NaiveDateTime,
    ) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let location = effective_location(location);
        let mut records = self.records.write().await;
        let mut touched = 0;

        for (label, count) in batch.iter() {
            if count == 0 {
                continue;
            }
            match records.get_mut(label) {
                Some(record) => {
                    record.count += count;
                    record.last_updated = now;
                    record.location = location.to_string();
                }
                None => {
                    debug!("First detection of {}", label);
                    records.insert(
                        label.to_string(),
                        PestRecord {
                            label: label.to_string(),
                            count,
                            last_updated: now,
                            location: location.to_string(),
                        },
                    );
                }
            }
            touched += 1;
        }

        touched
    }

    /// Load initial records (startup only); labels already present are kept.
    ///
    /// Returns the number of records inserted.
    pub async fn seed(&self, seeded: impl IntoIterator<Item = PestRecord>) -> usize {
        let mut records = self.records.write().await;
        let mut inserted = 0;
        for record in seeded {
            if !records.contains_key(&record.label) {
                records.insert(record.label.clone(), record);
                inserted += 1;
            }
        }
        inserted
    }

    /// Copy of all records, sorted by label
    pub async fn snapshot(&self) -> Vec<PestRecord> {
        let records = self.records.read().await;
        let mut out: Vec<PestRecord> = records.values().cloned().collect();
        out.sort_by(|a, b| a.label.cmp(&b.label));
        out
    }

    pub async fn get(&self, label: &str) -> Option<PestRecord> {
        self.records.read().await.get(label).cloned()
    }

    pub async fn count(&self, label: &str) -> u64 {
        self.records
            .read()
            .await
            .get(label)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
