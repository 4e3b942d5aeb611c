//! JSON bodies exchanged with the model service.

use serde::{Deserialize, Serialize};

use crate::ingest::ValidatedReading;

/// `POST /assets/{id}/predict_rul_bulk[_fast]` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub sequences: Vec<Vec<ValidatedReading>>,
}

/// One entry of a bulk response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkPrediction {
    /// Absent or null when the sequence failed
    #[serde(default)]
    pub predicted_rul: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponse {
    pub predictions: Vec<BulkPrediction>,
    #[serde(default)]
    pub total_processed: usize,
    #[serde(default)]
    pub failed_count: usize,
    #[serde(default)]
    pub processing_time_seconds: f64,
}

/// `POST /assets/{id}/predict_rul` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleRequest {
    pub sensor_data: Vec<ValidatedReading>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleResponse {
    pub predicted_rul: f64,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body: `{"detail": ...}`. Validation failures carry a list instead of
/// a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
