//! System-wide default constants.
//!
//! Centralises magic numbers used by the ingestion pipeline, the prediction
//! client and the alert classifier. Grouped by subsystem for easy discovery.

// ============================================================================
// Windowing
// ============================================================================

/// Readings per sequence submitted to the model.
///
/// Fixed by the model's input layer; sequences are never padded.
pub const SEQUENCE_LENGTH: usize = 50;

// ============================================================================
// Batch Orchestration
// ============================================================================

/// Sequences submitted per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Upper bound accepted for `batch.batch_size`.
pub const MAX_BATCH_SIZE: usize = 1_000;

// ============================================================================
// Prediction Service
// ============================================================================

/// Base URL of the prediction service when none is configured.
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";

/// HTTP timeout for a single prediction request (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Endpoint suffix for the standard bulk path.
pub const BULK_ENDPOINT: &str = "predict_rul_bulk";

/// Endpoint suffix for the fast bulk path.
pub const FAST_BULK_ENDPOINT: &str = "predict_rul_bulk_fast";

/// Endpoint suffix for single-sequence prediction.
pub const SINGLE_ENDPOINT: &str = "predict_rul";

// ============================================================================
// Alert Thresholds
// ============================================================================

/// Critical cutoff on the absolute RUL scale.
pub const ABSOLUTE_CRITICAL_RUL: f64 = 20_000.0;

/// Warning cutoff on the absolute RUL scale.
pub const ABSOLUTE_WARNING_RUL: f64 = 60_000.0;

/// Critical cutoff on the hour-equivalent scale (one week).
pub const HOURS_CRITICAL_RUL: f64 = 168.0;

/// Warning cutoff on the hour-equivalent scale (30 days).
pub const HOURS_WARNING_RUL: f64 = 720.0;

// ============================================================================
// Storage & Server
// ============================================================================

/// Default sled database path for predictions and alerts.
pub const DEFAULT_STORE_PATH: &str = "./data/rul_records.db";

/// Default bind address for the HTTP API.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";

/// Maximum CSV upload accepted by the HTTP API (bytes).
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Default number of points returned by the RUL history endpoint.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;
