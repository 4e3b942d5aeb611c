//! Mock RUL Prediction Service
//!
//! Stands in for the external model service during development and demos.
//! Serves the same routes and JSON bodies the pipeline client expects:
//!
//! - `GET  /health`
//! - `POST /assets/{id}/predict_rul`
//! - `POST /assets/{id}/predict_rul_bulk`
//! - `POST /assets/{id}/predict_rul_bulk_fast`
//!
//! Predicted RUL falls as mean vibration and bearing temperature rise, with
//! gaussian noise on top. A configurable share of sequences fails so error
//! handling can be exercised end to end.
//!
//! # Usage
//! ```bash
//! ./mock-rul-service --addr 127.0.0.1:8000 --fail-rate 0.05
//! RUL_SERVICE_URL=http://127.0.0.1:8000 ./rul-sentinel run --csv bearing1.csv --asset-id b1
//! ```

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use rul_sentinel::config::defaults::SEQUENCE_LENGTH;
use rul_sentinel::ingest::ValidatedReading;
use rul_sentinel::prediction::wire::{
    BulkPrediction, BulkRequest, BulkResponse, HealthResponse, SingleRequest, SingleResponse,
};

// ============================================================================
// Model Constants
// ============================================================================

/// RUL of a healthy bearing (absolute units)
const HEALTHY_RUL: f64 = 120_000.0;
/// Vibration magnitude at which predicted RUL reaches zero
const FAILURE_VIBRATION: f64 = 20.0;
/// Bearing temperature above which wear accelerates (deg C)
const HOT_BEARING_TEMP: f64 = 80.0;
/// Extra latency per sequence in standard mode
const STANDARD_LATENCY_PER_SEQUENCE: Duration = Duration::from_millis(5);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "mock-rul-service")]
#[command(about = "Mock RUL model service for RUL-Sentinel testing")]
#[command(version = "1.0")]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    addr: String,

    /// Probability that one sequence in a bulk call fails
    #[arg(long, default_value = "0.0", value_parser = parse_fail_rate)]
    fail_rate: f64,

    /// Relative standard deviation of the prediction noise
    #[arg(long, default_value = "0.03", value_parser = parse_noise)]
    noise: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_fail_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("'{s}' is not a number: {e}"))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("fail rate must be between 0 and 1, got {s}"))
    }
}

fn parse_noise(s: &str) -> Result<f64, String> {
    let noise: f64 = s.parse().map_err(|e| format!("'{s}' is not a number: {e}"))?;
    if noise.is_finite() && noise >= 0.0 {
        Ok(noise)
    } else {
        Err(format!("noise must be a finite, non-negative number, got {s}"))
    }
}

// ============================================================================
// Model
// ============================================================================

struct MockModel {
    rng: StdRng,
    noise: Normal<f64>,
    fail_rate: f64,
}

impl MockModel {
    fn new(args: &Args) -> anyhow::Result<Self> {
        let rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        anyhow::ensure!(
            (0.0..=1.0).contains(&args.fail_rate),
            "fail rate must be between 0 and 1, got {}",
            args.fail_rate
        );
        Ok(Self {
            rng,
            noise: Normal::new(0.0, args.noise.max(0.0))?,
            fail_rate: args.fail_rate,
        })
    }

    /// Deterministic part of the prediction.
    fn base_rul(readings: &[ValidatedReading]) -> f64 {
        let n = readings.len().max(1) as f64;
        let vibration = readings
            .iter()
            .map(|r| r.x_direction.hypot(r.y_direction))
            .sum::<f64>()
            / n;
        let temp = readings.iter().map(|r| r.bearing_tem).sum::<f64>() / n;

        let wear = (vibration / FAILURE_VIBRATION).clamp(0.0, 1.0);
        let heat_penalty = if temp > HOT_BEARING_TEMP {
            ((temp - HOT_BEARING_TEMP) / 40.0).min(0.5)
        } else {
            0.0
        };
        HEALTHY_RUL * (1.0 - wear) * (1.0 - heat_penalty)
    }

    fn predict(&mut self, readings: &[ValidatedReading]) -> f64 {
        let base = Self::base_rul(readings);
        (base * (1.0 + self.noise.sample(&mut self.rng))).max(1.0)
    }

    fn predict_or_fail(&mut self, readings: &[ValidatedReading]) -> BulkPrediction {
        if readings.len() != SEQUENCE_LENGTH {
            return BulkPrediction {
                predicted_rul: None,
                error: Some(format!(
                    "expected {SEQUENCE_LENGTH} readings, got {}",
                    readings.len()
                )),
            };
        }
        if self.rng.gen_bool(self.fail_rate) {
            return BulkPrediction {
                predicted_rul: None,
                error: Some("model inference failed".to_string()),
            };
        }
        BulkPrediction {
            predicted_rul: Some(self.predict(readings)),
            error: None,
        }
    }
}

type SharedModel = Arc<Mutex<MockModel>>;

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "detail": message.into() }))).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn predict_single(
    State(model): State<SharedModel>,
    Path(asset_id): Path<String>,
    Json(body): Json<SingleRequest>,
) -> Response {
    if body.sensor_data.len() != SEQUENCE_LENGTH {
        return detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "sensor_data must contain exactly {SEQUENCE_LENGTH} readings, got {}",
                body.sensor_data.len()
            ),
        );
    }
    let Ok(mut model) = model.lock() else {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "model unavailable");
    };
    let predicted_rul = model.predict(&body.sensor_data);
    info!(asset = %asset_id, predicted_rul, "single prediction");
    Json(SingleResponse { predicted_rul }).into_response()
}

async fn run_bulk(model: &SharedModel, asset_id: &str, body: &BulkRequest, fast: bool) -> Response {
    if body.sequences.is_empty() {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "sequences must not be empty");
    }
    let start = Instant::now();

    if !fast {
        let per_seq = u32::try_from(body.sequences.len()).unwrap_or(u32::MAX);
        tokio::time::sleep(STANDARD_LATENCY_PER_SEQUENCE.saturating_mul(per_seq)).await;
    }

    let predictions: Vec<BulkPrediction> = {
        let Ok(mut model) = model.lock() else {
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "model unavailable");
        };
        body.sequences.iter().map(|s| model.predict_or_fail(s)).collect()
    };

    let failed_count = predictions.iter().filter(|p| p.predicted_rul.is_none()).count();
    if failed_count > 0 {
        warn!(asset = %asset_id, failed_count, "bulk prediction had failures");
    }
    info!(
        asset = %asset_id,
        sequences = predictions.len(),
        fast,
        "bulk prediction"
    );

    Json(BulkResponse {
        total_processed: predictions.len(),
        failed_count,
        predictions,
        processing_time_seconds: start.elapsed().as_secs_f64(),
    })
    .into_response()
}

async fn predict_bulk(
    State(model): State<SharedModel>,
    Path(asset_id): Path<String>,
    Json(body): Json<BulkRequest>,
) -> Response {
    run_bulk(&model, &asset_id, &body, false).await
}

async fn predict_bulk_fast(
    State(model): State<SharedModel>,
    Path(asset_id): Path<String>,
    Json(body): Json<BulkRequest>,
) -> Response {
    run_bulk(&model, &asset_id, &body, true).await
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let model: SharedModel = Arc::new(Mutex::new(MockModel::new(&args)?));

    let app = Router::new()
        .route("/health", get(health))
        .route("/assets/:asset_id/predict_rul", post(predict_single))
        .route("/assets/:asset_id/predict_rul_bulk", post(predict_bulk))
        .route("/assets/:asset_id/predict_rul_bulk_fast", post(predict_bulk_fast))
        .with_state(model);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    info!(
        addr = %args.addr,
        fail_rate = args.fail_rate,
        "Mock RUL service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Mock RUL service shutting down");
        })
        .await?;
    Ok(())
}
