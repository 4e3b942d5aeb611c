//! Prediction Client Adapter
//!
//! Wraps the external RUL model service behind [`PredictionService`]. A batch
//! call either fails as a whole with one [`PredictionError`] or returns exactly
//! one [`PredictionOutcome`] per submitted sequence, in order.

mod client;
pub mod wire;

pub use client::HttpPredictionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::defaults;
use crate::ingest::{Sequence, ValidatedReading};
use wire::BulkPrediction;

// ============================================================================
// Processing Mode
// ============================================================================

/// Which bulk endpoint to call. Both share one contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    Standard,
    Fast,
}

impl ProcessingMode {
    /// Endpoint path segment under `/assets/{id}/`.
    pub const fn bulk_endpoint(self) -> &'static str {
        match self {
            Self::Standard => defaults::BULK_ENDPOINT,
            Self::Fast => defaults::FAST_BULK_ENDPOINT,
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "fast" => Ok(Self::Fast),
            other => Err(format!(
                "unknown processing mode '{other}' (expected 'standard' or 'fast')"
            )),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Prediction result for one sequence.
///
/// `predicted_rul <= 0` is a failure even when `error` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub sequence_number: usize,
    pub predicted_rul: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionOutcome {
    pub const fn success(sequence_number: usize, predicted_rul: f64) -> Self {
        Self {
            sequence_number,
            predicted_rul,
            error: None,
        }
    }

    pub fn failed(sequence_number: usize, error: impl Into<String>) -> Self {
        Self {
            sequence_number,
            predicted_rul: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.predicted_rul.is_finite() && self.predicted_rul > 0.0
    }

    /// Why this outcome counts as a failure, if it does.
    pub fn failure_reason(&self) -> Option<String> {
        if let Some(e) = &self.error {
            Some(e.clone())
        } else if self.is_success() {
            None
        } else {
            Some(format!("non-positive RUL returned ({})", self.predicted_rul))
        }
    }
}

/// Filler message for sequences a short response did not cover.
pub const MISSING_PREDICTION: &str = "missing prediction in batch response";

/// Pair a batch with the service's predictions, one outcome per sequence.
///
/// Short responses are padded with error outcomes; surplus entries are dropped.
pub fn align_outcomes(batch: &[Sequence], predictions: Vec<BulkPrediction>) -> Vec<PredictionOutcome> {
    if predictions.len() > batch.len() {
        tracing::warn!(
            expected = batch.len(),
            received = predictions.len(),
            "Prediction service returned surplus entries; ignoring extras"
        );
    } else if predictions.len() < batch.len() {
        tracing::warn!(
            expected = batch.len(),
            received = predictions.len(),
            "Prediction service returned a short batch"
        );
    }

    let mut predictions = predictions.into_iter();
    batch
        .iter()
        .map(|seq| match predictions.next() {
            Some(p) => PredictionOutcome {
                sequence_number: seq.sequence_number(),
                predicted_rul: p.predicted_rul.unwrap_or(0.0),
                error: p.error,
            },
            None => PredictionOutcome::failed(seq.sequence_number(), MISSING_PREDICTION),
        })
        .collect()
}

/// Reconcile a service's outcomes with the batch it was given.
///
/// Outcomes are matched by sequence number. Sequences left unanswered get a
/// [`MISSING_PREDICTION`] error outcome; duplicates and numbers outside the
/// batch are dropped.
pub fn conform_outcomes(batch: &[Sequence], outcomes: Vec<PredictionOutcome>) -> Vec<PredictionOutcome> {
    let received = outcomes.len();
    let mut by_number: HashMap<usize, PredictionOutcome> = HashMap::with_capacity(received);
    for outcome in outcomes {
        by_number.entry(outcome.sequence_number).or_insert(outcome);
    }

    let conformed: Vec<PredictionOutcome> = batch
        .iter()
        .map(|seq| {
            by_number
                .remove(&seq.sequence_number())
                .unwrap_or_else(|| PredictionOutcome::failed(seq.sequence_number(), MISSING_PREDICTION))
        })
        .collect();

    let answered = received - by_number.len();
    if received != batch.len() || !by_number.is_empty() {
        tracing::warn!(
            expected = batch.len(),
            received,
            answered,
            "Prediction service outcomes did not match the batch"
        );
    }
    conformed
}

// ============================================================================
// Errors
// ============================================================================

/// Batch-level adapter failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    /// Structured error body from the service (its `detail` message)
    #[error("{message}")]
    Service { status: u16, message: String },
    /// Network failure or timeout
    #[error("no response from prediction service ({0})")]
    NoResponse(String),
    /// Response arrived but could not be decoded
    #[error("malformed prediction service response: {0}")]
    Decode(String),
    /// The request could not be built at all (bad URL, bad input shape)
    #[error("invalid prediction request: {0}")]
    InvalidRequest(String),
}

impl PredictionError {
    /// Faults that would repeat on every batch and therefore end the run.
    pub const fn is_setup_fault(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

// ============================================================================
// Service Trait
// ============================================================================

/// The external model, as seen by the pipeline.
#[async_trait]
pub trait PredictionService: Send + Sync + 'static {
    /// Predict every sequence of one batch.
    async fn submit_batch(
        &self,
        asset_id: &str,
        batch: &[Sequence],
        mode: ProcessingMode,
    ) -> Result<Vec<PredictionOutcome>, PredictionError>;

    /// Predict one window of readings.
    async fn predict_single(
        &self,
        asset_id: &str,
        readings: &[ValidatedReading],
    ) -> Result<f64, PredictionError>;

    /// Service liveness (`status` field of the health route).
    async fn health(&self) -> Result<String, PredictionError>;

    /// Human-readable name for logging.
    fn service_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Vec<Sequence> {
        let reading = ValidatedReading {
            x_direction: 0.1,
            y_direction: 0.2,
            bearing_tem: 40.0,
            env_temp: 20.0,
        };
        (1..=n)
            .map(|k| Sequence::new(k, vec![reading; defaults::SEQUENCE_LENGTH]).unwrap())
            .collect()
    }

    fn ok(rul: f64) -> BulkPrediction {
        BulkPrediction {
            predicted_rul: Some(rul),
            error: None,
        }
    }

    #[test]
    fn test_mode_endpoints() {
        assert_eq!(ProcessingMode::Standard.bulk_endpoint(), "predict_rul_bulk");
        assert_eq!(ProcessingMode::Fast.bulk_endpoint(), "predict_rul_bulk_fast");
        assert_eq!("FAST".parse::<ProcessingMode>().unwrap(), ProcessingMode::Fast);
        assert!("turbo".parse::<ProcessingMode>().is_err());
    }

    #[test]
    fn test_sentinel_rul_is_failure() {
        let o = PredictionOutcome::success(1, 0.0);
        assert!(!o.is_success());
        assert!(o.failure_reason().unwrap().contains("non-positive"));
        assert!(PredictionOutcome::success(1, 1.5).is_success());
    }

    #[test]
    fn test_align_passes_sequence_errors_through() {
        let preds = vec![
            ok(100.0),
            BulkPrediction {
                predicted_rul: Some(-1.0),
                error: Some("scaler failed".to_string()),
            },
        ];
        let out = align_outcomes(&batch(2), preds);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_success());
        assert_eq!(out[1].sequence_number, 2);
        assert_eq!(out[1].error.as_deref(), Some("scaler failed"));
    }

    #[test]
    fn test_align_pads_short_response() {
        let out = align_outcomes(&batch(3), vec![ok(5.0)]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].error.as_deref(), Some(MISSING_PREDICTION));
        assert_eq!(out[2].sequence_number, 3);
    }

    #[test]
    fn test_align_ignores_surplus() {
        let out = align_outcomes(&batch(1), vec![ok(5.0), ok(6.0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].predicted_rul, 5.0);
    }

    #[test]
    fn test_conform_pads_drops_and_matches_by_number() {
        let outcomes = vec![
            PredictionOutcome::success(3, 30.0),
            PredictionOutcome::success(1, 10.0),
            PredictionOutcome::success(1, 99.0),
            PredictionOutcome::success(9, 90.0),
        ];
        let out = conform_outcomes(&batch(3), outcomes);
        let numbers: Vec<usize> = out.iter().map(|o| o.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(out[0].predicted_rul, 10.0);
        assert_eq!(out[1].error.as_deref(), Some(MISSING_PREDICTION));
        assert_eq!(out[2].predicted_rul, 30.0);
    }

    #[test]
    fn test_setup_fault_classification() {
        assert!(PredictionError::InvalidRequest("bad url".into()).is_setup_fault());
        assert!(!PredictionError::NoResponse("timeout".into()).is_setup_fault());
        assert!(
            !PredictionError::Service {
                status: 400,
                message: "bad".into()
            }
            .is_setup_fault()
        );
    }
}
