//! Record Store
//!
//! Persistence for predictions and alerts behind [`RecordStore`], plus the
//! two derived read queries the dashboard needs: latest RUL per subject and
//! the RUL history of one subject.
//!
//! Two implementations: [`MemoryRecordStore`] for tests and store-less runs,
//! [`SledRecordStore`] for a durable embedded database.

mod sled_store;

pub use sled_store::SledRecordStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::alerts::AlertRecord;

// ============================================================================
// Records
// ============================================================================

/// A persisted successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub subject_id: String,
    /// `None` for single (non-bulk) predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<usize>,
    pub predicted_rul: f64,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn now(subject_id: &str, sequence_number: Option<usize>, predicted_rul: f64) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            sequence_number,
            predicted_rul,
            created_at: Utc::now(),
        }
    }
}

/// One row of the "subjects with most recent RUL" listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject_id: String,
    pub latest_rul: f64,
    pub latest_at: DateTime<Utc>,
    pub prediction_count: u64,
}

impl SubjectSummary {
    fn first(record: &PredictionRecord) -> Self {
        Self {
            subject_id: record.subject_id.clone(),
            latest_rul: record.predicted_rul,
            latest_at: record.created_at,
            prediction_count: 1,
        }
    }

    fn absorb(&mut self, record: &PredictionRecord) {
        self.latest_rul = record.predicted_rul;
        self.latest_at = record.created_at;
        self.prediction_count += 1;
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Record store lock poisoned")]
    Poisoned,
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        Self::Database(err.to_string())
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Insert/query surface of the record store.
pub trait RecordStore: Send + Sync {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<(), StorageError>;

    fn insert_alert(&self, record: &AlertRecord) -> Result<(), StorageError>;

    /// Every subject with its most recent RUL, ordered by subject id.
    fn latest_by_subject(&self) -> Result<Vec<SubjectSummary>, StorageError>;

    /// The newest `limit` predictions of one subject, oldest first.
    fn rul_history(&self, subject_id: &str, limit: usize) -> Result<Vec<PredictionRecord>, StorageError>;

    /// The newest `limit` alerts across subjects, newest first.
    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StorageError>;

    /// Make pending writes durable. No-op for volatile stores.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    predictions: Vec<PredictionRecord>,
    alerts: Vec<AlertRecord>,
    latest: BTreeMap<String, SubjectSummary>,
}

/// Volatile store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prediction_count(&self) -> usize {
        self.inner.read().map_or(0, |g| g.predictions.len())
    }

    pub fn alert_count(&self) -> usize {
        self.inner.read().map_or(0, |g| g.alerts.len())
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        inner
            .latest
            .entry(record.subject_id.clone())
            .and_modify(|s| s.absorb(record))
            .or_insert_with(|| SubjectSummary::first(record));
        inner.predictions.push(record.clone());
        Ok(())
    }

    fn insert_alert(&self, record: &AlertRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        inner.alerts.push(record.clone());
        Ok(())
    }

    fn latest_by_subject(&self) -> Result<Vec<SubjectSummary>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.latest.values().cloned().collect())
    }

    fn rul_history(&self, subject_id: &str, limit: usize) -> Result<Vec<PredictionRecord>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        let mut history: Vec<PredictionRecord> = inner
            .predictions
            .iter()
            .rev()
            .filter(|p| p.subject_id == subject_id)
            .take(limit)
            .cloned()
            .collect();
        history.reverse();
        Ok(history)
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.alerts.iter().rev().take(limit).cloned().collect())
    }
}
