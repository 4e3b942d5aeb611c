//! State shared by the HTTP handlers.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::orchestrator::{BatchOrchestrator, RunHandle};
use crate::storage::RecordStore;

/// Cloned into every handler; the current run sits behind `Arc<RwLock<..>>`.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: BatchOrchestrator,
    /// Handle of the most recent run (finished or not)
    pub current_run: Arc<RwLock<Option<RunHandle>>>,
    /// Used when `POST /run` omits `asset_id`
    pub default_asset_id: String,
    pub started: Instant,
}

impl ApiState {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self {
            orchestrator,
            current_run: Arc::new(RwLock::new(None)),
            default_asset_id: String::new(),
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_default_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.default_asset_id = asset_id.into();
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn RecordStore>> {
        self.orchestrator.store()
    }
}
