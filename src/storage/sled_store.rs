//! sled-backed record store.
//!
//! Trees:
//! - `predictions`: `subject_id ++ 0x00 ++ id(u64 BE)` → JSON `PredictionRecord`
//! - `latest`: `subject_id` → JSON `SubjectSummary`
//! - `alerts`: `id(u64 BE)` → JSON `AlertRecord`
//!
//! Ids come from `Db::generate_id`, which is monotonic, so big-endian keys
//! sort in insertion order within a subject prefix.

use std::path::Path;
use std::sync::Arc;

use super::{PredictionRecord, RecordStore, StorageError, SubjectSummary};
use crate::alerts::AlertRecord;

#[derive(Clone)]
pub struct SledRecordStore {
    db: Arc<sled::Db>,
    predictions: sled::Tree,
    latest: sled::Tree,
    alerts: sled::Tree,
}

fn subject_prefix(subject_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(subject_id.len() + 1);
    prefix.extend_from_slice(subject_id.as_bytes());
    prefix.push(0);
    prefix
}

impl SledRecordStore {
    /// Open or create the store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let store = Self {
            predictions: db.open_tree("predictions")?,
            latest: db.open_tree("latest")?,
            alerts: db.open_tree("alerts")?,
            db: Arc::new(db),
        };
        tracing::info!(path = %path_ref.display(), "Record store opened");
        Ok(store)
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }
}

impl RecordStore for SledRecordStore {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<(), StorageError> {
        let id = self.db.generate_id()?;
        let mut key = subject_prefix(&record.subject_id);
        key.extend_from_slice(&id.to_be_bytes());
        self.predictions.insert(key, serde_json::to_vec(record)?)?;

        let summary = match self.latest.get(record.subject_id.as_bytes())? {
            Some(bytes) => {
                let mut s: SubjectSummary = serde_json::from_slice(&bytes)?;
                s.absorb(record);
                s
            }
            None => SubjectSummary::first(record),
        };
        self.latest
            .insert(record.subject_id.as_bytes(), serde_json::to_vec(&summary)?)?;
        Ok(())
    }

    fn insert_alert(&self, record: &AlertRecord) -> Result<(), StorageError> {
        let id = self.db.generate_id()?;
        self.alerts.insert(id.to_be_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    fn latest_by_subject(&self) -> Result<Vec<SubjectSummary>, StorageError> {
        let mut out = Vec::new();
        for item in self.latest.iter() {
            let (_key, value) = item?;
            match serde_json::from_slice::<SubjectSummary>(&value) {
                Ok(summary) => out.push(summary),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable subject summary"),
            }
        }
        Ok(out)
    }

    fn rul_history(&self, subject_id: &str, limit: usize) -> Result<Vec<PredictionRecord>, StorageError> {
        let mut history = Vec::with_capacity(limit.min(1024));

        // Newest first, then flip to chronological order.
        for item in self.predictions.scan_prefix(subject_prefix(subject_id)).rev() {
            if history.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            if let Ok(record) = serde_json::from_slice::<PredictionRecord>(&value) {
                history.push(record);
            }
        }

        history.reverse();
        Ok(history)
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StorageError> {
        let mut alerts = Vec::with_capacity(limit.min(1024));
        for item in self.alerts.iter().rev() {
            if alerts.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            if let Ok(alert) = serde_json::from_slice::<AlertRecord>(&value) {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }

    /// Inserts rely on sled's background flushing; call this at shutdown.
    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
