//! HTTP handlers. All return `Response` via [`ApiResponse`] or
//! [`ApiErrorResponse`].

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use super::state::ApiState;
use crate::config::defaults;
use crate::ingest::parse_csv_str;
use crate::orchestrator::{RunRequest, RunSnapshot, StartError};
use crate::prediction::ProcessingMode;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthV2 {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub run_active: bool,
    pub prediction_service: ServiceHealth,
    pub storage: bool,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub reachable: bool,
    pub status: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunStarted {
    pub run_id: Option<uuid::Uuid>,
    pub asset_id: String,
    pub batch_size: usize,
    pub mode: ProcessingMode,
    pub total_rows: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelRequested {
    pub run_id: Option<uuid::Uuid>,
    pub cancel_requested: bool,
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    pub asset_id: Option<String>,
    pub batch_size: Option<usize>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// Health
// ============================================================================

/// `GET /api/v2/health`
pub async fn health(State(state): State<ApiState>) -> Response {
    let run_active = state
        .current_run
        .read()
        .await
        .as_ref()
        .is_some_and(|h| !h.is_finished());

    let prediction_service = match state.orchestrator.service().health().await {
        Ok(status) => ServiceHealth {
            reachable: true,
            status: Some(status),
            error: None,
        },
        Err(e) => ServiceHealth {
            reachable: false,
            status: None,
            error: Some(e.to_string()),
        },
    };

    ApiResponse::ok(HealthV2 {
        status: "ok",
        uptime_secs: state.started.elapsed().as_secs(),
        run_active,
        prediction_service,
        storage: state.store().is_some(),
    })
}

// ============================================================================
// Run control
// ============================================================================

async fn latest_snapshot(state: &ApiState) -> Option<RunSnapshot> {
    state.current_run.read().await.as_ref().map(|h| h.snapshot())
}

/// `GET /api/v2/run`
pub async fn get_run(State(state): State<ApiState>) -> Response {
    match latest_snapshot(&state).await {
        Some(snapshot) => ApiResponse::ok(snapshot),
        None => ApiErrorResponse::not_found("No run has been started"),
    }
}

/// `POST /api/v2/run?asset_id=..&batch_size=..&mode=..` with CSV text as body.
pub async fn start_run(
    State(state): State<ApiState>,
    Query(query): Query<RunQuery>,
    body: String,
) -> Response {
    let mode = match query.mode.as_deref().map(str::parse::<ProcessingMode>).transpose() {
        Ok(m) => m,
        Err(e) => return ApiErrorResponse::bad_request(e),
    };
    if query.batch_size == Some(0) {
        return ApiErrorResponse::bad_request(StartError::InvalidBatchSize.to_string());
    }
    if query.batch_size.is_some_and(|b| b > defaults::MAX_BATCH_SIZE) {
        return ApiErrorResponse::bad_request(format!(
            "batch_size must be between 1 and {}",
            defaults::MAX_BATCH_SIZE
        ));
    }

    let asset_id = query
        .asset_id
        .unwrap_or_else(|| state.default_asset_id.clone());

    let input = match parse_csv_str(&body) {
        Ok(input) => input,
        Err(e) => return ApiErrorResponse::bad_request(e.to_string()),
    };

    // Hold the write lock across the check and the start so two uploads
    // cannot both pass the "no active run" check.
    let mut current = state.current_run.write().await;
    if current.as_ref().is_some_and(|h| !h.is_finished()) {
        return ApiErrorResponse::conflict(StartError::AlreadyRunning.to_string());
    }

    let orchestrator = state.orchestrator.clone().with_overrides(query.batch_size, mode);
    let settings = *orchestrator.settings();
    let total_rows = input.total_rows();

    match orchestrator.start(RunRequest::new(asset_id.clone(), input), CancellationToken::new()) {
        Ok(handle) => {
            let mut rx = handle.subscribe();
            let run_id = rx
                .wait_for(|s| s.run_id.is_some())
                .await
                .ok()
                .and_then(|s| s.run_id);
            *current = Some(handle);
            info!(asset = %asset_id, rows = total_rows, "Run accepted via API");
            ApiResponse::accepted(RunStarted {
                run_id,
                asset_id: asset_id.trim().to_string(),
                batch_size: settings.batch_size,
                mode: settings.mode,
                total_rows,
            })
        }
        Err(e) => {
            warn!(asset = %asset_id, error = %e, "Run rejected");
            ApiErrorResponse::bad_request(e.to_string())
        }
    }
}

/// `POST /api/v2/run/cancel`
pub async fn cancel_run(State(state): State<ApiState>) -> Response {
    let current = state.current_run.read().await;
    match current.as_ref() {
        Some(handle) if !handle.is_finished() => {
            handle.cancel();
            info!("Run cancellation requested via API");
            ApiResponse::accepted(CancelRequested {
                run_id: handle.snapshot().run_id,
                cancel_requested: true,
            })
        }
        _ => ApiErrorResponse::conflict("No run in progress"),
    }
}

/// `GET /api/v2/run/results`
pub async fn run_results(State(state): State<ApiState>) -> Response {
    match state.current_run.read().await.as_ref() {
        Some(handle) => ApiResponse::ok(handle.results()),
        None => ApiErrorResponse::not_found("No run has been started"),
    }
}

/// `GET /api/v2/run/alerts`
pub async fn run_alerts(State(state): State<ApiState>) -> Response {
    match state.current_run.read().await.as_ref() {
        Some(handle) => ApiResponse::ok(handle.alerts()),
        None => ApiErrorResponse::not_found("No run has been started"),
    }
}

// ============================================================================
// Derived reads
// ============================================================================

/// `GET /api/v2/assets`
pub async fn list_assets(State(state): State<ApiState>) -> Response {
    let Some(store) = state.store() else {
        return ApiErrorResponse::service_unavailable("Record store not configured");
    };
    match store.latest_by_subject() {
        Ok(subjects) => ApiResponse::ok(subjects),
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}

/// `GET /api/v2/assets/:id/history?limit=`
pub async fn asset_history(
    State(state): State<ApiState>,
    Path(asset_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(store) = state.store() else {
        return ApiErrorResponse::service_unavailable("Record store not configured");
    };
    let limit = query.limit.unwrap_or(defaults::DEFAULT_HISTORY_LIMIT);
    match store.rul_history(&asset_id, limit) {
        Ok(history) if history.is_empty() => {
            ApiErrorResponse::not_found(format!("No predictions recorded for asset '{asset_id}'"))
        }
        Ok(history) => ApiResponse::ok(history),
        Err(e) => ApiErrorResponse::internal(e.to_string()),
    }
}
