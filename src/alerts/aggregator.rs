//! Per-run result aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AlertRecord, AlertThresholds, Severity};
use crate::prediction::PredictionOutcome;
use crate::storage::{PredictionRecord, RecordStore};

/// One element of the live result stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub sequence_number: usize,
    pub predicted_rul: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Running statistics over one run's outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: usize,
    pub succeeded: usize,
    pub errored: usize,
    pub warning_alerts: usize,
    pub critical_alerts: usize,
    pub min_rul: Option<f64>,
    pub max_rul: Option<f64>,
    pub mean_rul: Option<f64>,
    pub last_rul: Option<f64>,
}

impl AggregateStats {
    fn record_success(&mut self, rul: f64) {
        self.total += 1;
        self.succeeded += 1;
        self.min_rul = Some(self.min_rul.map_or(rul, |m| m.min(rul)));
        self.max_rul = Some(self.max_rul.map_or(rul, |m| m.max(rul)));
        let n = self.succeeded as f64;
        self.mean_rul = Some(self.mean_rul.map_or(rul, |m| m + (rul - m) / n));
        self.last_rul = Some(rul);
    }

    fn record_error(&mut self) {
        self.total += 1;
        self.errored += 1;
    }

    pub const fn alerts_raised(&self) -> usize {
        self.warning_alerts + self.critical_alerts
    }
}

/// Converts outcomes into result records, persisted predictions and alerts.
///
/// Store failures never lose an outcome: the result record is kept and the
/// write error is logged.
pub struct ResultAggregator {
    subject_id: String,
    thresholds: AlertThresholds,
    adjustment_factor: f64,
    store: Option<Arc<dyn RecordStore>>,
    results: Vec<ResultRecord>,
    alerts: Vec<AlertRecord>,
    stats: AggregateStats,
}

impl ResultAggregator {
    pub fn new(subject_id: impl Into<String>, thresholds: AlertThresholds) -> Self {
        Self {
            subject_id: subject_id.into(),
            thresholds,
            adjustment_factor: 1.0,
            store: None,
            results: Vec::new(),
            alerts: Vec::new(),
            stats: AggregateStats::default(),
        }
    }

    /// Multiply every RUL by `factor` before it is recorded or classified.
    #[must_use]
    pub fn with_adjustment_factor(mut self, factor: f64) -> Self {
        self.adjustment_factor = factor;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Absorb one outcome. Returns the alert it raised, if any.
    pub fn absorb(&mut self, outcome: &PredictionOutcome) -> Option<AlertRecord> {
        let timestamp = Utc::now();

        if let Some(reason) = outcome.failure_reason() {
            self.stats.record_error();
            self.results.push(ResultRecord {
                sequence_number: outcome.sequence_number,
                predicted_rul: outcome.predicted_rul,
                timestamp,
                error: Some(reason),
            });
            return None;
        }

        let rul = outcome.predicted_rul * self.adjustment_factor;
        self.stats.record_success(rul);
        self.results.push(ResultRecord {
            sequence_number: outcome.sequence_number,
            predicted_rul: rul,
            timestamp,
            error: None,
        });

        self.record_prediction(Some(outcome.sequence_number), rul)
    }

    /// Persist a successful prediction and derive its alert.
    ///
    /// Shared with the single-prediction path, which has no sequence number.
    pub fn record_prediction(&mut self, sequence_number: Option<usize>, rul: f64) -> Option<AlertRecord> {
        if let Some(store) = &self.store {
            let record = PredictionRecord {
                subject_id: self.subject_id.clone(),
                sequence_number,
                predicted_rul: rul,
                created_at: Utc::now(),
            };
            if let Err(e) = store.insert_prediction(&record) {
                warn!(asset = %self.subject_id, error = %e, "Failed to persist prediction");
            }
        }

        let alert = AlertRecord::for_prediction(&self.subject_id, sequence_number, rul, &self.thresholds)?;
        match alert.severity {
            Severity::Critical => self.stats.critical_alerts += 1,
            Severity::Warning => self.stats.warning_alerts += 1,
            Severity::None => {}
        }
        debug!(asset = %self.subject_id, severity = %alert.severity, rul, "Alert raised");

        if let Some(store) = &self.store {
            if let Err(e) = store.insert_alert(&alert) {
                warn!(asset = %self.subject_id, error = %e, "Failed to persist alert");
            }
        }

        self.alerts.push(alert.clone());
        Some(alert)
    }

    /// Apply the configured adjustment to a raw RUL.
    pub fn adjust(&self, raw_rul: f64) -> f64 {
        raw_rul * self.adjustment_factor
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn alerts(&self) -> &[AlertRecord] {
        &self.alerts
    }

    pub const fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub const fn thresholds(&self) -> AlertThresholds {
        self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryRecordStore, StorageError, SubjectSummary};

    const T: AlertThresholds = AlertThresholds {
        critical: 20_000.0,
        warning: 60_000.0,
    };

    #[test]
    fn test_absorb_classifies_and_counts() {
        let mut agg = ResultAggregator::new("bearing-1", T);
        assert!(agg.absorb(&PredictionOutcome::success(1, 15_000.0)).is_some());
        assert!(agg.absorb(&PredictionOutcome::success(2, 45_000.0)).is_some());
        assert!(agg.absorb(&PredictionOutcome::success(3, 90_000.0)).is_none());
        assert!(agg.absorb(&PredictionOutcome::failed(4, "boom")).is_none());
        assert!(agg.absorb(&PredictionOutcome::success(5, 0.0)).is_none());

        let s = agg.stats();
        assert_eq!(s.total, 5);
        assert_eq!(s.succeeded, 3);
        assert_eq!(s.errored, 2);
        assert_eq!(s.critical_alerts, 1);
        assert_eq!(s.warning_alerts, 1);
        assert_eq!(s.min_rul, Some(15_000.0));
        assert_eq!(s.max_rul, Some(90_000.0));
        assert_eq!(s.mean_rul, Some(50_000.0));
        assert_eq!(s.last_rul, Some(90_000.0));

        assert_eq!(agg.results().len(), 5);
        assert_eq!(agg.results()[3].error.as_deref(), Some("boom"));
        assert!(agg.results()[4].error.is_some());
        assert_eq!(agg.alerts().len(), 2);
    }

    #[test]
    fn test_adjustment_factor_applied_before_classification() {
        let mut agg = ResultAggregator::new("a", T).with_adjustment_factor(0.5);
        let alert = agg.absorb(&PredictionOutcome::success(1, 30_000.0)).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.rul_at_alert, 15_000.0);
        assert_eq!(agg.results()[0].predicted_rul, 15_000.0);
    }

    #[test]
    fn test_predictions_and_alerts_persisted() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut agg = ResultAggregator::new("a", T).with_store(store.clone());
        agg.absorb(&PredictionOutcome::success(1, 10_000.0));
        agg.absorb(&PredictionOutcome::success(2, 80_000.0));
        agg.absorb(&PredictionOutcome::failed(3, "x"));
        assert_eq!(store.prediction_count(), 2);
        assert_eq!(store.alert_count(), 1);
    }

    struct BrokenStore;

    impl RecordStore for BrokenStore {
        fn insert_prediction(&self, _: &PredictionRecord) -> Result<(), StorageError> {
            Err(StorageError::Database("disk full".into()))
        }
        fn insert_alert(&self, _: &AlertRecord) -> Result<(), StorageError> {
            Err(StorageError::Database("disk full".into()))
        }
        fn latest_by_subject(&self) -> Result<Vec<SubjectSummary>, StorageError> {
            Ok(Vec::new())
        }
        fn rul_history(&self, _: &str, _: usize) -> Result<Vec<PredictionRecord>, StorageError> {
            Ok(Vec::new())
        }
        fn recent_alerts(&self, _: usize) -> Result<Vec<AlertRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_store_failures_are_swallowed() {
        let mut agg = ResultAggregator::new("a", T).with_store(Arc::new(BrokenStore));
        let alert = agg.absorb(&PredictionOutcome::success(1, 100.0));
        assert!(alert.is_some());
        assert_eq!(agg.results().len(), 1);
        assert_eq!(agg.stats().succeeded, 1);
        assert_eq!(agg.alerts().len(), 1);
    }
}
