//! RUL-Sentinel: bearing remaining-useful-life monitoring
//!
//! Turns raw tabular sensor exports into RUL predictions and threshold alerts.
//!
//! ## Architecture
//!
//! - **Ingest**: CSV tokenizing, header alias resolution, row validation and
//!   50-reading sequence windowing
//! - **Orchestrator**: sequential batch submission with cooperative
//!   cancellation and live run snapshots
//! - **Prediction**: client adapter for the external RUL model service
//! - **Alerts**: result aggregation, threshold classification, alert records
//! - **Storage**: record store for predictions and alerts (memory or sled)
//! - **API**: axum routes for run control and record-store reads

pub mod alerts;
pub mod api;
pub mod config;
pub mod ingest;
pub mod orchestrator;
pub mod prediction;
pub mod storage;

// Re-export configuration
pub use config::{ConfigError, ConfigProvenance, PipelineConfig, ThresholdScale};

// Re-export ingestion types
pub use ingest::{
    CanonicalField, CsvInput, FieldAliasTable, IngestError, RawRow, RejectionRecord, Sequence,
    ValidatedReading,
};

// Re-export the run pipeline
pub use orchestrator::{
    BatchOrchestrator, OrchestratorSettings, RunHandle, RunPhase, RunRequest, RunSnapshot,
    RunSummary, SinglePrediction, SinglePredictionError, StartError,
};

// Re-export prediction client
pub use prediction::{
    HttpPredictionClient, PredictionError, PredictionOutcome, PredictionService, ProcessingMode,
};

// Re-export alerting and storage
pub use alerts::{AlertRecord, AlertThresholds, ResultAggregator, ResultRecord, Severity};
pub use storage::{
    MemoryRecordStore, PredictionRecord, RecordStore, SledRecordStore, StorageError,
    SubjectSummary,
};
