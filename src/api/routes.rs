//! Route table.

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::ApiState;

/// Routes mounted under `/api/v2`.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Run control
        .route("/run", get(handlers::get_run).post(handlers::start_run))
        .route("/run/cancel", post(handlers::cancel_run))
        .route("/run/results", get(handlers::run_results))
        .route("/run/alerts", get(handlers::run_alerts))
        // Record store reads
        .route("/assets", get(handlers::list_assets))
        .route("/assets/:id/history", get(handlers::asset_history))
        .with_state(state)
}
