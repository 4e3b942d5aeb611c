//! Run lifecycle and observable run state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::alerts::{AggregateStats, AlertRecord, ResultRecord};
use crate::ingest::RejectionRecord;
use crate::prediction::ProcessingMode;

// ============================================================================
// Run Phase
// ============================================================================

/// Lifecycle of one run.
///
/// ```text
/// Idle → Validating → Windowing → Running → Completed | Cancelled | Failed
///                         └──────────────────→ Completed   (zero sequences)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Validating,
    Windowing,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunPhase {
    /// No further transitions allowed.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// A run is in progress.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Validating | Self::Windowing | Self::Running)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Validating)
                | (Self::Validating, Self::Windowing)
                | (Self::Windowing, Self::Running | Self::Completed)
                | (Self::Running, Self::Completed | Self::Cancelled | Self::Failed)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Validating => write!(f, "validating"),
            Self::Windowing => write!(f, "windowing"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of a run, published on every state change and batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub asset_id: String,
    pub phase: RunPhase,
    pub mode: ProcessingMode,
    pub batch_size: usize,

    pub total_rows: usize,
    pub valid_rows: usize,
    pub rejected_rows: usize,
    pub rejections: Arc<Vec<RejectionRecord>>,

    pub sequences_formed: usize,
    pub leftover_readings: usize,
    pub discarded_sequences: usize,

    pub batches_total: usize,
    pub batches_done: usize,
    pub processed_count: usize,
    pub error_count: usize,
    /// Sequences per second since `Running` began
    pub throughput: f64,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub stats: AggregateStats,
    /// Filled once the phase is terminal. Live records are in [`RunRecords`].
    pub results: Vec<ResultRecord>,
    pub alerts: Vec<AlertRecord>,

    pub status_message: String,
}

impl RunSnapshot {
    /// Aggregate status, meaningful once the phase is terminal.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            asset_id: self.asset_id.clone(),
            phase: self.phase,
            valid_rows: self.valid_rows,
            rejected_rows: self.rejected_rows,
            rejections: self.rejections.clone(),
            sequences_formed: self.sequences_formed,
            leftover_readings: self.leftover_readings,
            discarded_sequences: self.discarded_sequences,
            predictions_succeeded: self.stats.succeeded,
            predictions_errored: self.stats.errored,
            alerts_raised: self.stats.alerts_raised(),
            throughput: self.throughput,
            status_message: self.status_message.clone(),
        }
    }
}

/// Final aggregate status of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Option<Uuid>,
    pub asset_id: String,
    pub phase: RunPhase,
    pub valid_rows: usize,
    pub rejected_rows: usize,
    pub rejections: Arc<Vec<RejectionRecord>>,
    pub sequences_formed: usize,
    pub leftover_readings: usize,
    pub discarded_sequences: usize,
    pub predictions_succeeded: usize,
    pub predictions_errored: usize,
    pub alerts_raised: usize,
    pub throughput: f64,
    pub status_message: String,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.phase, self.status_message)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Append-only result and alert log shared by a run and its handles.
#[derive(Debug, Default)]
pub struct RunRecords {
    inner: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    results: Vec<ResultRecord>,
    alerts: Vec<AlertRecord>,
}

impl RunRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, results: &[ResultRecord], alerts: &[AlertRecord]) {
        let mut records = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        records.results.extend_from_slice(results);
        records.alerts.extend_from_slice(alerts);
    }

    pub fn results(&self) -> Vec<ResultRecord> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).results.clone()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).alerts.clone()
    }

    pub fn result_count(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).results.len()
    }
}
