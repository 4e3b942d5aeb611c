//! The batch run loop.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::state::{RunPhase, RunRecords, RunSnapshot, RunSummary};
use crate::alerts::{AlertRecord, AlertThresholds, ResultAggregator, ResultRecord};
use crate::config::{defaults, PipelineConfig};
use crate::ingest::{self, CsvInput, FieldAliasTable, RejectionRecord};
use crate::prediction::{conform_outcomes, PredictionOutcome, PredictionService, ProcessingMode};
use crate::storage::RecordStore;

// ============================================================================
// Settings & Requests
// ============================================================================

/// The knobs one orchestrator is parameterized by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub batch_size: usize,
    pub mode: ProcessingMode,
    pub thresholds: AlertThresholds,
    pub adjustment_factor: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for OrchestratorSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch.batch_size,
            mode: config.service.mode,
            thresholds: config.alerts.thresholds(),
            adjustment_factor: config.alerts.adjustment_factor,
        }
    }
}

/// Parsed rows for one subject.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub asset_id: String,
    pub input: CsvInput,
}

impl RunRequest {
    pub fn new(asset_id: impl Into<String>, input: CsvInput) -> Self {
        Self {
            asset_id: asset_id.into(),
            input,
        }
    }
}

/// Why a run (or single prediction) was refused before it began.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("asset id must not be blank")]
    BlankAssetId,
    #[error("at least {required} data rows are required to form one sequence, got {rows}")]
    TooFewRows { rows: usize, required: usize },
    #[error("only {valid} valid readings after validation, {required} required")]
    TooFewValidReadings { valid: usize, required: usize },
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error("a run is already in progress")]
    AlreadyRunning,
}

/// Run-level preconditions shared by the bulk and single paths.
pub fn check_request(asset_id: &str, input: &CsvInput) -> Result<(), StartError> {
    if asset_id.trim().is_empty() {
        return Err(StartError::BlankAssetId);
    }
    // Undecodable lines are reported but cannot become readings.
    let rows = input.rows.len();
    if rows < defaults::SEQUENCE_LENGTH {
        return Err(StartError::TooFewRows {
            rows,
            required: defaults::SEQUENCE_LENGTH,
        });
    }
    Ok(())
}

// ============================================================================
// Run Handle
// ============================================================================

/// Observer side of a spawned run: snapshot receiver plus its cancel token.
#[derive(Debug, Clone)]
pub struct RunHandle {
    snapshots: watch::Receiver<RunSnapshot>,
    records: Arc<RunRecords>,
    cancel: CancellationToken,
}

impl RunHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Results recorded so far, including those of a run still in progress.
    pub fn results(&self) -> Vec<ResultRecord> {
        self.records.results()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.records.alerts()
    }

    /// Independent receiver for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.clone()
    }

    /// Request cooperative cancellation; observed before the next batch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.snapshots.borrow().phase.is_terminal()
    }

    /// Wait for a terminal phase and return the final summary.
    pub async fn wait(&self) -> RunSummary {
        let mut rx = self.snapshots.clone();
        let result = rx.wait_for(|s| s.phase.is_terminal()).await.map(|s| s.summary());
        result.unwrap_or_else(|_| rx.borrow().summary())
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Mutable run state. Owned by the run loop; everyone else sees snapshots.
struct RunState {
    snapshot: RunSnapshot,
    aggregator: ResultAggregator,
    records: Arc<RunRecords>,
    running_since: Option<Instant>,
    cancel: CancellationToken,
    tx: watch::Sender<RunSnapshot>,
}

impl RunState {
    fn transition(&mut self, next: RunPhase) {
        let current = self.snapshot.phase;
        if current.can_transition_to(next) {
            self.snapshot.phase = next;
        } else {
            warn!(from = %current, to = %next, "Ignoring invalid run phase transition");
        }
        if next.is_terminal() {
            self.snapshot.finished_at = Some(Utc::now());
        }
    }

    fn absorb(&mut self, outcomes: &[PredictionOutcome]) {
        let results_before = self.aggregator.results().len();
        let alerts_before = self.aggregator.alerts().len();
        for outcome in outcomes {
            self.aggregator.absorb(outcome);
        }
        self.records.append(
            &self.aggregator.results()[results_before..],
            &self.aggregator.alerts()[alerts_before..],
        );
        self.snapshot.processed_count += outcomes.len();
        self.snapshot.error_count = self.aggregator.stats().errored;
        self.snapshot.batches_done += 1;
        if let Some(since) = self.running_since {
            let elapsed = since.elapsed().as_secs_f64();
            self.snapshot.throughput = if elapsed > 0.0 {
                self.snapshot.processed_count as f64 / elapsed
            } else {
                0.0
            };
        }
    }

    fn publish(&mut self) {
        self.publish_with(None);
    }

    fn publish_with(&mut self, detail: Option<&str>) {
        self.snapshot.stats = self.aggregator.stats().clone();
        if self.snapshot.phase.is_terminal() {
            self.snapshot.results = self.aggregator.results().to_vec();
            self.snapshot.alerts = self.aggregator.alerts().to_vec();
        }
        self.snapshot.status_message = self.status_message(detail);
        self.tx.send_replace(self.snapshot.clone());
    }

    /// Keeps validation drops, prediction errors and cancellation apart.
    fn status_message(&self, detail: Option<&str>) -> String {
        let s = &self.snapshot;
        let validation = format!(
            "{} of {} rows valid, {} rejected during validation",
            s.valid_rows, s.total_rows, s.rejected_rows
        );
        let windowing = format!(
            "{} sequences formed, {} leftover readings not submitted",
            s.sequences_formed, s.leftover_readings
        );
        let prediction = format!(
            "{} sequences predicted, {} errored during prediction, {} alerts raised",
            self.aggregator.stats().succeeded,
            s.error_count,
            self.aggregator.stats().alerts_raised()
        );

        let head = match s.phase {
            RunPhase::Idle => "Idle".to_string(),
            RunPhase::Validating => "Validating rows".to_string(),
            RunPhase::Windowing => format!("Windowing; {validation}"),
            RunPhase::Running => format!(
                "Running batch {}/{}; {validation}; {windowing}; {prediction}",
                (s.batches_done + 1).min(s.batches_total),
                s.batches_total
            ),
            RunPhase::Completed if s.sequences_formed == 0 => format!(
                "Completed with nothing to predict: fewer than {} valid readings; {validation}; {windowing}",
                defaults::SEQUENCE_LENGTH
            ),
            RunPhase::Completed => format!("Completed; {validation}; {windowing}; {prediction}"),
            RunPhase::Cancelled => format!(
                "Cancelled by operator after {} of {} batches; {validation}; {windowing}; {prediction}",
                s.batches_done, s.batches_total
            ),
            RunPhase::Failed => format!(
                "Failed after {} of {} batches; {validation}; {windowing}; {prediction}",
                s.batches_done, s.batches_total
            ),
        };

        match detail {
            Some(d) => format!("{head} ({d})"),
            None => head,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives validated, windowed input through the prediction service in
/// strictly sequential batches.
#[derive(Clone)]
pub struct BatchOrchestrator {
    service: Arc<dyn PredictionService>,
    aliases: Arc<FieldAliasTable>,
    store: Option<Arc<dyn RecordStore>>,
    settings: OrchestratorSettings,
}

impl BatchOrchestrator {
    pub fn new(
        service: Arc<dyn PredictionService>,
        aliases: Arc<FieldAliasTable>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            service,
            aliases,
            store: None,
            settings,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn service(&self) -> &Arc<dyn PredictionService> {
        &self.service
    }

    pub fn aliases(&self) -> &Arc<FieldAliasTable> {
        &self.aliases
    }

    pub fn store(&self) -> Option<&Arc<dyn RecordStore>> {
        self.store.as_ref()
    }

    /// Same orchestrator with different batch size / mode for one run.
    #[must_use]
    pub fn with_overrides(mut self, batch_size: Option<usize>, mode: Option<ProcessingMode>) -> Self {
        if let Some(b) = batch_size {
            self.settings.batch_size = b;
        }
        if let Some(m) = mode {
            self.settings.mode = m;
        }
        self
    }

    fn check_start(&self, request: &RunRequest) -> Result<(), StartError> {
        if self.settings.batch_size == 0 {
            return Err(StartError::InvalidBatchSize);
        }
        check_request(&request.asset_id, &request.input)
    }

    /// Validate preconditions, then run on a spawned task.
    ///
    /// On `Err` nothing was started.
    pub fn start(&self, request: RunRequest, cancel: CancellationToken) -> Result<RunHandle, StartError> {
        self.check_start(&request)?;

        let (tx, rx) = watch::channel(RunSnapshot::default());
        let records = Arc::new(RunRecords::new());
        let orchestrator = self.clone();
        let task_cancel = cancel.clone();
        let task_records = Arc::clone(&records);
        tokio::spawn(async move {
            orchestrator.drive(request, task_cancel, tx, task_records).await;
        });

        Ok(RunHandle {
            snapshots: rx,
            records,
            cancel,
        })
    }

    /// Run to completion on the current task, publishing to `tx`.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
        tx: watch::Sender<RunSnapshot>,
    ) -> Result<RunSummary, StartError> {
        self.check_start(&request)?;
        Ok(self.drive(request, cancel, tx, Arc::new(RunRecords::new())).await)
    }

    async fn drive(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
        tx: watch::Sender<RunSnapshot>,
        records: Arc<RunRecords>,
    ) -> RunSummary {
        let RunRequest { asset_id, input } = request;
        let asset_id = asset_id.trim().to_string();

        let mut aggregator = ResultAggregator::new(asset_id.clone(), self.settings.thresholds)
            .with_adjustment_factor(self.settings.adjustment_factor);
        if let Some(store) = &self.store {
            aggregator = aggregator.with_store(Arc::clone(store));
        }

        let mut state = RunState {
            snapshot: RunSnapshot {
                run_id: Some(Uuid::new_v4()),
                asset_id: asset_id.clone(),
                mode: self.settings.mode,
                batch_size: self.settings.batch_size,
                total_rows: input.total_rows(),
                started_at: Some(Utc::now()),
                ..RunSnapshot::default()
            },
            aggregator,
            records,
            running_since: None,
            cancel,
            tx,
        };

        info!(
            asset = %asset_id,
            rows = input.total_rows(),
            batch_size = self.settings.batch_size,
            mode = %self.settings.mode,
            "Run started"
        );

        // ── Validating ──────────────────────────────────────────────────────
        state.transition(RunPhase::Validating);
        state.publish();

        let resolution = self.aliases.resolve(&input.headers);
        for field in resolution.missing_fields() {
            warn!(asset = %asset_id, "{}", resolution.unresolved_message(field));
        }
        let report = ingest::validate_rows(&input.rows, &resolution);

        let mut rejections: Vec<RejectionRecord> = input.unreadable;
        rejections.extend(report.rejections);
        rejections.sort_by_key(|r| r.row_number);

        state.snapshot.valid_rows = report.readings.len();
        state.snapshot.rejected_rows = rejections.len();
        state.snapshot.rejections = Arc::new(rejections);
        if state.snapshot.rejected_rows > 0 {
            warn!(
                asset = %asset_id,
                rejected = state.snapshot.rejected_rows,
                valid = state.snapshot.valid_rows,
                "Rows rejected during validation"
            );
        }

        // ── Windowing ───────────────────────────────────────────────────────
        state.transition(RunPhase::Windowing);
        let windows = ingest::window(&report.readings);
        state.snapshot.sequences_formed = windows.sequences.len();
        state.snapshot.leftover_readings = windows.leftover_readings;
        state.snapshot.discarded_sequences = windows.discarded_sequences;
        state.snapshot.batches_total = windows.sequences.len().div_ceil(self.settings.batch_size);
        state.publish();

        if windows.sequences.is_empty() {
            state.transition(RunPhase::Completed);
            state.publish();
            info!(asset = %asset_id, "{}", state.snapshot.status_message);
            return state.snapshot.summary();
        }

        // ── Running ─────────────────────────────────────────────────────────
        state.transition(RunPhase::Running);
        state.running_since = Some(Instant::now());
        state.publish();

        let batches_total = state.snapshot.batches_total;
        let mut failure: Option<String> = None;

        for (index, batch) in windows.sequences.chunks(self.settings.batch_size).enumerate() {
            if state.cancel.is_cancelled() {
                info!(asset = %asset_id, batch = index + 1, "Cancellation observed at batch boundary");
                state.transition(RunPhase::Cancelled);
                break;
            }

            let outcomes = match self.service.submit_batch(&asset_id, batch, self.settings.mode).await {
                Ok(outcomes) => conform_outcomes(batch, outcomes),
                Err(e) if e.is_setup_fault() => {
                    error!(asset = %asset_id, batch = index + 1, error = %e, "Prediction request could not be built; aborting run");
                    failure = Some(e.to_string());
                    state.transition(RunPhase::Failed);
                    break;
                }
                Err(e) => {
                    warn!(
                        asset = %asset_id,
                        batch = index + 1,
                        sequences = batch.len(),
                        error = %e,
                        "Batch failed; recording error outcomes"
                    );
                    let message = e.to_string();
                    batch
                        .iter()
                        .map(|s| PredictionOutcome::failed(s.sequence_number(), message.clone()))
                        .collect()
                }
            };

            state.absorb(&outcomes);
            state.publish();

            info!(
                asset = %asset_id,
                batch = index + 1,
                of = batches_total,
                processed = state.snapshot.processed_count,
                errors = state.snapshot.error_count,
                throughput = state.snapshot.throughput,
                "Batch complete"
            );
        }

        if state.snapshot.phase == RunPhase::Running {
            state.transition(RunPhase::Completed);
        }

        state.publish_with(failure.as_deref());
        info!(asset = %asset_id, phase = %state.snapshot.phase, "{}", state.snapshot.status_message);
        state.snapshot.summary()
    }
}
