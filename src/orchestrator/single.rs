//! One-shot prediction over the most recent window of readings.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::run::{check_request, BatchOrchestrator, StartError};
use crate::alerts::{AlertRecord, ResultAggregator, Severity};
use crate::config::defaults::SEQUENCE_LENGTH;
use crate::ingest::{self, CsvInput};
use crate::prediction::PredictionError;

#[derive(Debug, thiserror::Error)]
pub enum SinglePredictionError {
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("prediction service returned a non-positive RUL ({0})")]
    InvalidRul(f64),
}

/// Result of a single prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinglePrediction {
    pub asset_id: String,
    pub predicted_rul: f64,
    pub severity: Severity,
    pub alert: Option<AlertRecord>,
    /// CSV row numbers the submitted window starts and ends on
    pub first_row: usize,
    pub last_row: usize,
    pub rejected_rows: usize,
}

impl BatchOrchestrator {
    /// Predict one sequence: the last `SEQUENCE_LENGTH` valid readings.
    ///
    /// Uses the same alias table, thresholds, adjustment and store as bulk
    /// runs. The prediction is persisted and, crossing a threshold, an alert.
    pub async fn predict_single(
        &self,
        asset_id: &str,
        input: &CsvInput,
    ) -> Result<SinglePrediction, SinglePredictionError> {
        check_request(asset_id, input)?;
        let asset_id = asset_id.trim();

        let resolution = self.aliases().resolve(&input.headers);
        let mut readings = Vec::with_capacity(input.rows.len());
        let mut row_numbers = Vec::with_capacity(input.rows.len());
        for row in &input.rows {
            if let Ok(reading) = ingest::validate_row(row, &resolution, row.row_number()) {
                readings.push(reading);
                row_numbers.push(row.row_number());
            }
        }
        let rejected_rows = input.total_rows() - readings.len();

        if readings.len() < SEQUENCE_LENGTH {
            return Err(StartError::TooFewValidReadings {
                valid: readings.len(),
                required: SEQUENCE_LENGTH,
            }
            .into());
        }
        let start = readings.len() - SEQUENCE_LENGTH;
        let window = &readings[start..];

        let raw = self.service().predict_single(asset_id, window).await?;
        if !raw.is_finite() || raw <= 0.0 {
            return Err(SinglePredictionError::InvalidRul(raw));
        }

        let settings = self.settings();
        let mut aggregator = ResultAggregator::new(asset_id, settings.thresholds)
            .with_adjustment_factor(settings.adjustment_factor);
        if let Some(store) = self.store() {
            aggregator = aggregator.with_store(store.clone());
        }
        let predicted_rul = aggregator.adjust(raw);
        let alert = aggregator.record_prediction(None, predicted_rul);
        let severity = settings.thresholds.classify(predicted_rul);

        info!(asset = %asset_id, rul = predicted_rul, severity = %severity, "Single prediction");

        Ok(SinglePrediction {
            asset_id: asset_id.to_string(),
            predicted_rul,
            severity,
            alert,
            first_row: row_numbers[start],
            last_row: row_numbers[row_numbers.len() - 1],
            rejected_rows,
        })
    }
}
