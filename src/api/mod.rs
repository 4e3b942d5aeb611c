//! REST API module using Axum
//!
//! Exposes run control and run snapshots for polling consumers, plus the
//! record-store reads (subjects with latest RUL, RUL history). All routes
//! live under `/api/v2` and share one response envelope.

pub mod envelope;
pub mod handlers;
mod routes;
mod state;

pub use state::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::defaults::MAX_UPLOAD_BYTES;

/// Environment variable with comma-separated origins allowed by CORS.
pub const CORS_ENV_VAR: &str = "RUL_SENTINEL_CORS_ORIGINS";

/// Restrictive by default (same-origin only).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    // Outermost first. CSV uploads exceed axum's default body limit.
    // Applied innermost first via `Router::layer` so each layer's response
    // body is re-boxed (tower-http's `Cors` requires `ResBody: Default`).
    Router::new()
        .nest("/api/v2", routes::api_routes(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
