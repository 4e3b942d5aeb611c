//! HTTP client for the RUL model service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::wire::{BulkRequest, BulkResponse, ErrorBody, HealthResponse, SingleRequest, SingleResponse};
use super::{align_outcomes, PredictionError, PredictionOutcome, PredictionService, ProcessingMode};
use crate::config::{defaults, ServiceConfig};
use crate::ingest::{Sequence, ValidatedReading};

/// reqwest-backed [`PredictionService`].
#[derive(Clone)]
pub struct HttpPredictionClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpPredictionClient {
    /// Build a client with a bounded per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PredictionError> {
        let base_url = reqwest::Url::parse(base_url.trim()).map_err(|e| {
            PredictionError::InvalidRequest(format!("invalid service URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PredictionError::InvalidRequest(format!(
                "service URL '{base_url}' cannot carry a path"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictionError::InvalidRequest(format!("HTTP client setup failed: {e}")))?;

        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, PredictionError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, PredictionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                PredictionError::InvalidRequest(format!("service URL '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn transport_error(e: &reqwest::Error) -> PredictionError {
    if e.is_builder() {
        PredictionError::InvalidRequest(e.to_string())
    } else if e.is_timeout() {
        PredictionError::NoResponse("request timed out".to_string())
    } else {
        PredictionError::NoResponse(e.to_string())
    }
}

/// Read a response, mapping non-2xx statuses to the service's `detail`.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, PredictionError> {
    let status = resp.status();
    let body = resp.bytes().await.map_err(|e| transport_error(&e))?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&body).map_or_else(
            |_| {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                if text.is_empty() {
                    format!("prediction service returned {status}")
                } else {
                    text
                }
            },
            |b| b.message(),
        );
        return Err(PredictionError::Service {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&body).map_err(|e| PredictionError::Decode(e.to_string()))
}

#[async_trait]
impl PredictionService for HttpPredictionClient {
    async fn submit_batch(
        &self,
        asset_id: &str,
        batch: &[Sequence],
        mode: ProcessingMode,
    ) -> Result<Vec<PredictionOutcome>, PredictionError> {
        let url = self.endpoint(&["assets", asset_id, mode.bulk_endpoint()])?;
        let body = BulkRequest {
            sequences: batch.iter().map(|s| s.readings().to_vec()).collect(),
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let parsed: BulkResponse = read_json(resp).await?;

        tracing::debug!(
            asset = %asset_id,
            sequences = batch.len(),
            total_processed = parsed.total_processed,
            failed = parsed.failed_count,
            service_secs = parsed.processing_time_seconds,
            "Bulk prediction response"
        );

        Ok(align_outcomes(batch, parsed.predictions))
    }

    async fn predict_single(
        &self,
        asset_id: &str,
        readings: &[ValidatedReading],
    ) -> Result<f64, PredictionError> {
        if readings.len() != defaults::SEQUENCE_LENGTH {
            return Err(PredictionError::InvalidRequest(format!(
                "expected {} readings, got {}",
                defaults::SEQUENCE_LENGTH,
                readings.len()
            )));
        }

        let url = self.endpoint(&["assets", asset_id, defaults::SINGLE_ENDPOINT])?;
        let body = SingleRequest {
            sensor_data: readings.to_vec(),
        };
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let parsed: SingleResponse = read_json(resp).await?;
        Ok(parsed.predicted_rul)
    }

    async fn health(&self) -> Result<String, PredictionError> {
        let url = self.endpoint(&["health"])?;
        let resp = self.http.get(url).send().await.map_err(|e| transport_error(&e))?;
        let parsed: HealthResponse = read_json(resp).await?;
        Ok(parsed.status)
    }

    fn service_name(&self) -> &str {
        "HTTP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn reading() -> ValidatedReading {
        ValidatedReading {
            x_direction: 0.1,
            y_direction: -0.1,
            bearing_tem: 41.0,
            env_temp: 21.0,
        }
    }

    fn batch(n: usize) -> Vec<Sequence> {
        (1..=n)
            .map(|k| Sequence::new(k, vec![reading(); defaults::SEQUENCE_LENGTH]).unwrap())
            .collect()
    }

    fn client(url: &str) -> HttpPredictionClient {
        HttpPredictionClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_bulk_success_one_outcome_per_sequence() {
        let app = Router::new().route(
            "/assets/:id/predict_rul_bulk",
            post(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                assert_eq!(id, "bearing 1");
                let n = body["sequences"].as_array().unwrap().len();
                assert_eq!(body["sequences"][0].as_array().unwrap().len(), 50);
                assert!(body["sequences"][0][0]["bearing_tem"].is_number());
                let preds: Vec<Value> = (0..n).map(|i| json!({"predicted_rul": 1000.0 * (i + 1) as f64})).collect();
                Json(json!({
                    "predictions": preds,
                    "total_processed": n,
                    "failed_count": 0,
                    "processing_time_seconds": 0.01
                }))
            }),
        );
        let url = spawn(app).await;

        let out = client(&url)
            .submit_batch("bearing 1", &batch(3), ProcessingMode::Standard)
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].sequence_number, 3);
        assert_eq!(out[2].predicted_rul, 3000.0);
    }

    #[tokio::test]
    async fn test_fast_mode_uses_fast_endpoint() {
        let app = Router::new().route(
            "/assets/:id/predict_rul_bulk_fast",
            post(|| async { Json(json!({"predictions": [{"predicted_rul": 7.0}]})) }),
        );
        let url = spawn(app).await;
        let out = client(&url)
            .submit_batch("a", &batch(1), ProcessingMode::Fast)
            .await
            .unwrap();
        assert_eq!(out[0].predicted_rul, 7.0);
    }

    #[tokio::test]
    async fn test_service_detail_becomes_error_message() {
        let app = Router::new().route(
            "/assets/:id/predict_rul_bulk",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"detail": "Model or scalers not loaded."})),
                )
            }),
        );
        let url = spawn(app).await;
        let err = client(&url)
            .submit_batch("a", &batch(2), ProcessingMode::Standard)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PredictionError::Service {
                status: 503,
                message: "Model or scalers not loaded.".to_string()
            }
        );
        assert!(!err.is_setup_fault());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_no_response() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .submit_batch("a", &batch(1), ProcessingMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::NoResponse(_)), "{err:?}");
        assert!(err.to_string().starts_with("no response from prediction service"));
    }

    #[tokio::test]
    async fn test_timeout_is_no_response() {
        let app = Router::new().route(
            "/assets/:id/predict_rul_bulk",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"predictions": []}))
            }),
        );
        let url = spawn(app).await;
        let slow = HttpPredictionClient::new(&url, Duration::from_millis(100)).unwrap();
        let err = slow
            .submit_batch("a", &batch(1), ProcessingMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::NoResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let app = Router::new().route("/assets/:id/predict_rul_bulk", post(|| async { "not json" }));
        let url = spawn(app).await;
        let err = client(&url)
            .submit_batch("a", &batch(1), ProcessingMode::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Decode(_)));
    }

    #[tokio::test]
    async fn test_single_and_health() {
        let app = Router::new()
            .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
            .route(
                "/assets/:id/predict_rul",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["sensor_data"].as_array().unwrap().len(), 50);
                    Json(json!({"predicted_rul": 4242.0}))
                }),
            );
        let url = spawn(app).await;
        let c = client(&format!("{url}/"));
        assert_eq!(c.health().await.unwrap(), "ok");
        let readings = vec![reading(); 50];
        assert_eq!(c.predict_single("a", &readings).await.unwrap(), 4242.0);
    }

    #[tokio::test]
    async fn test_single_rejects_wrong_length() {
        let c = client("http://127.0.0.1:9");
        let err = c.predict_single("a", &[reading(); 3]).await.unwrap_err();
        assert!(err.is_setup_fault());
    }

    #[test]
    fn test_invalid_base_url_is_setup_fault() {
        let err = HttpPredictionClient::new("not a url", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(err.is_setup_fault());
        assert!(HttpPredictionClient::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_endpoint_encodes_asset_id() {
        let c = client("http://127.0.0.1:8000/api/");
        let url = c.endpoint(&["assets", "pump/7", "predict_rul"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/api/assets/pump%2F7/predict_rul");
    }
}
