//! Batch Orchestrator
//!
//! Owns a run from parsed rows to terminal phase:
//!
//! 1. **Validating**: every row through the row validator
//! 2. **Windowing**: valid readings into 50-reading sequences
//! 3. **Running**: sequences in strictly sequential batches through the
//!    prediction service, outcomes into the result aggregator
//!
//! Cancellation is cooperative and only observed between batches. Observers
//! get immutable [`RunSnapshot`]s over a `tokio::sync::watch` channel.

mod run;
mod single;
mod state;

pub use run::{check_request, BatchOrchestrator, OrchestratorSettings, RunHandle, RunRequest, StartError};
pub use single::{SinglePrediction, SinglePredictionError};
pub use state::{RunPhase, RunRecords, RunSnapshot, RunSummary};
