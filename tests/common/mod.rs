//! Shared fixtures: a scripted prediction service and CSV builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use rul_sentinel::ingest::{FieldAliasTable, Sequence, ValidatedReading};
use rul_sentinel::orchestrator::{BatchOrchestrator, OrchestratorSettings};
use rul_sentinel::prediction::{
    PredictionError, PredictionOutcome, PredictionService, ProcessingMode,
};
use rul_sentinel::AlertThresholds;

pub const HEADER: &str = "x direction,y direction,bearing temp,env temp";

/// CSV text with `rows` data rows. Data rows listed in `bad_rows` (1-based)
/// carry `N/A` for bearing temperature.
pub fn csv_text(rows: usize, bad_rows: &[usize]) -> String {
    let mut text = String::from(HEADER);
    text.push('\n');
    for i in 1..=rows {
        if bad_rows.contains(&i) {
            text.push_str("0.1,0.2,N/A,20.0\n");
        } else {
            text.push_str(&format!("0.1,0.2,{:.1},20.0\n", 40.0 + (i % 10) as f64));
        }
    }
    text
}

pub fn settings(batch_size: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        batch_size,
        mode: ProcessingMode::Standard,
        thresholds: AlertThresholds {
            critical: 20_000.0,
            warning: 60_000.0,
        },
        adjustment_factor: 1.0,
    }
}

pub fn orchestrator(service: Arc<ScriptedService>, batch_size: usize) -> BatchOrchestrator {
    BatchOrchestrator::new(
        service,
        Arc::new(FieldAliasTable::builtin()),
        settings(batch_size),
    )
}

/// Prediction service whose answers are fixed up front.
///
/// RULs cycle over `ruls` by sequence number. Calls are counted from 1.
pub struct ScriptedService {
    ruls: Vec<f64>,
    single_rul: f64,
    batch_errors: HashMap<usize, PredictionError>,
    cancel_during: Option<(usize, CancellationToken)>,
    gate: Option<Arc<Notify>>,
    answer_limit: Option<usize>,
    calls: AtomicUsize,
    modes: Mutex<Vec<ProcessingMode>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl ScriptedService {
    pub fn new(ruls: Vec<f64>) -> Self {
        Self {
            ruls,
            single_rul: 50_000.0,
            batch_errors: HashMap::new(),
            cancel_during: None,
            gate: None,
            answer_limit: None,
            calls: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_single_rul(mut self, rul: f64) -> Self {
        self.single_rul = rul;
        self
    }

    /// Fail call number `call` as a whole.
    pub fn failing_call(mut self, call: usize, error: PredictionError) -> Self {
        self.batch_errors.insert(call, error);
        self
    }

    /// Cancel `token` while call number `call` is in flight.
    pub fn cancelling_during(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_during = Some((call, token));
        self
    }

    /// Hold every batch until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Answer at most `limit` sequences of each batch.
    pub fn answering_at_most(mut self, limit: usize) -> Self {
        self.answer_limit = Some(limit);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<ProcessingMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionService for ScriptedService {
    async fn submit_batch(
        &self,
        _asset_id: &str,
        batch: &[Sequence],
        mode: ProcessingMode,
    ) -> Result<Vec<PredictionOutcome>, PredictionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batch_sizes.lock().unwrap().push(batch.len());
        self.modes.lock().unwrap().push(mode);

        if let Some((at, token)) = &self.cancel_during {
            if *at == call {
                token.cancel();
            }
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = self.batch_errors.get(&call) {
            return Err(err.clone());
        }

        let answered = self.answer_limit.unwrap_or(batch.len()).min(batch.len());
        Ok(batch[..answered]
            .iter()
            .map(|s| {
                let n = s.sequence_number();
                PredictionOutcome::success(n, self.ruls[(n - 1) % self.ruls.len()])
            })
            .collect())
    }

    async fn predict_single(
        &self,
        _asset_id: &str,
        readings: &[ValidatedReading],
    ) -> Result<f64, PredictionError> {
        if readings.len() != 50 {
            return Err(PredictionError::InvalidRequest(format!(
                "expected 50 readings, got {}",
                readings.len()
            )));
        }
        Ok(self.single_rul)
    }

    async fn health(&self) -> Result<String, PredictionError> {
        Ok("ok".to_string())
    }

    fn service_name(&self) -> &str {
        "scripted"
    }
}
