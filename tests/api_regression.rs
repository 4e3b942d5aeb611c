//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v2/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

use common::{csv_text, orchestrator, ScriptedService};
use rul_sentinel::api::{create_app, ApiState};
use rul_sentinel::orchestrator::RunPhase;
use rul_sentinel::storage::MemoryRecordStore;

fn state_with_store(service: Arc<ScriptedService>) -> ApiState {
    let store = Arc::new(MemoryRecordStore::new());
    ApiState::new(orchestrator(service, 30).with_store(store)).with_default_asset("default-bearing")
}

async fn send(state: &ApiState, method: &str, uri: &str, body: String) -> Response {
    create_app(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "text/csv")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn json(resp: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Block until the current run reaches a terminal phase.
async fn wait_for_run(state: &ApiState) -> RunPhase {
    let handle = state.current_run.read().await.clone().unwrap();
    handle.wait().await.phase
}

#[tokio::test]
async fn test_health_reports_service_and_storage() {
    let state = state_with_store(Arc::new(ScriptedService::new(vec![100_000.0])));
    let resp = send(&state, "GET", "/api/v2/health", String::new()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json(resp).await;
    assert_eq!(v["data"]["status"], "ok");
    assert_eq!(v["data"]["prediction_service"]["reachable"], true);
    assert_eq!(v["data"]["storage"], true);
    assert_eq!(v["data"]["run_active"], false);
}

#[tokio::test]
async fn test_run_endpoints_404_before_first_run() {
    let state = state_with_store(Arc::new(ScriptedService::new(vec![100_000.0])));
    for uri in ["/api/v2/run", "/api/v2/run/results", "/api/v2/run/alerts"] {
        let resp = send(&state, "GET", uri, String::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "GET {uri}");
        assert_eq!(json(resp).await["error"]["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn test_upload_starts_run_and_results_become_available() {
    let state = state_with_store(Arc::new(ScriptedService::new(vec![15_000.0, 90_000.0])));

    let resp = send(&state, "POST", "/api/v2/run?asset_id=bearing-3", csv_text(120, &[])).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let v = json(resp).await;
    assert_eq!(v["data"]["asset_id"], "bearing-3");
    assert_eq!(v["data"]["total_rows"], 120);
    assert!(v["data"]["run_id"].is_string());

    assert_eq!(wait_for_run(&state).await, RunPhase::Completed);

    let v = json(send(&state, "GET", "/api/v2/run", String::new()).await).await;
    assert_eq!(v["data"]["phase"], "completed");
    assert_eq!(v["data"]["sequences_formed"], 2);
    assert_eq!(v["data"]["leftover_readings"], 20);

    let v = json(send(&state, "GET", "/api/v2/run/results", String::new()).await).await;
    assert_eq!(v["data"].as_array().unwrap().len(), 2);

    let v = json(send(&state, "GET", "/api/v2/run/alerts", String::new()).await).await;
    let alerts = v["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "critical");

    let v = json(send(&state, "GET", "/api/v2/assets", String::new()).await).await;
    assert_eq!(v["data"][0]["subject_id"], "bearing-3");
    assert_eq!(v["data"][0]["latest_rul"], 90_000.0);

    let resp = send(&state, "GET", "/api/v2/assets/bearing-3/history?limit=1", String::new()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json(resp).await;
    assert_eq!(v["data"].as_array().unwrap().len(), 1);
    assert_eq!(v["data"][0]["predicted_rul"], 90_000.0);
}

#[tokio::test]
async fn test_missing_asset_id_uses_default() {
    let state = state_with_store(Arc::new(ScriptedService::new(vec![100_000.0])));
    let resp = send(&state, "POST", "/api/v2/run", csv_text(50, &[])).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(json(resp).await["data"]["asset_id"], "default-bearing");
    wait_for_run(&state).await;
}

#[tokio::test]
async fn test_rejected_uploads_return_400() {
    let state = state_with_store(Arc::new(ScriptedService::new(vec![100_000.0])));

    let cases = [
        ("/api/v2/run?asset_id=b1", csv_text(10, &[]), "at least 50"),
        ("/api/v2/run?asset_id=%20", csv_text(60, &[]), "blank"),
        ("/api/v2/run?asset_id=b1&mode=turbo", csv_text(60, &[]), "turbo"),
        ("/api/v2/run?asset_id=b1&batch_size=0", csv_text(60, &[]), "batch size"),
    ];
    for (uri, body, needle) in cases {
        let resp = send(&state, "POST", uri, body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "POST {uri}");
        let v = json(resp).await;
        assert_eq!(v["error"]["code"], "BAD_REQUEST");
        let message = v["error"]["message"].as_str().unwrap();
        assert!(message.contains(needle), "POST {uri}: {message}");
    }

    // Nothing was started.
    assert!(state.current_run.read().await.is_none());
}

#[tokio::test]
async fn test_second_upload_conflicts_and_cancel_stops_run() {
    let gate = Arc::new(Notify::new());
    let service = Arc::new(ScriptedService::new(vec![100_000.0]).gated(gate.clone()));
    let state = state_with_store(service.clone());

    let resp = send(&state, "POST", "/api/v2/run?asset_id=b1&batch_size=1", csv_text(150, &[])).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = send(&state, "POST", "/api/v2/run?asset_id=b2", csv_text(150, &[])).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = send(&state, "POST", "/api/v2/run/cancel", String::new()).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(json(resp).await["data"]["cancel_requested"], true);

    // Release the in-flight batch; the loop then sees the cancellation.
    gate.notify_one();
    assert_eq!(wait_for_run(&state).await, RunPhase::Cancelled);
    assert_eq!(service.calls(), 1);

    let v = json(send(&state, "GET", "/api/v2/run", String::new()).await).await;
    assert_eq!(v["data"]["phase"], "cancelled");
    assert_eq!(v["data"]["batches_done"], 1);
    assert_eq!(v["data"]["batches_total"], 3);

    let resp = send(&state, "POST", "/api/v2/run/cancel", String::new()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_asset_history_is_404() {
    let state = state_with_store(Arc::new(ScriptedService::new(vec![100_000.0])));
    let resp = send(&state, "GET", "/api/v2/assets/nope/history", String::new()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_reads_need_a_store() {
    let service = Arc::new(ScriptedService::new(vec![100_000.0]));
    let state = ApiState::new(orchestrator(service, 30));
    for uri in ["/api/v2/assets", "/api/v2/assets/b1/history"] {
        let resp = send(&state, "GET", uri, String::new()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE, "GET {uri}");
    }
}

#[tokio::test]
async fn test_oversized_upload_is_refused_by_middleware() {
    let service = Arc::new(ScriptedService::new(vec![100_000.0]));
    let state = state_with_store(service.clone());
    let body = "0".repeat(rul_sentinel::config::defaults::MAX_UPLOAD_BYTES + 1);

    let resp = create_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v2/run?asset_id=b1")
                .header("content-type", "text/csv")
                .header("content-length", body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(state.current_run.read().await.is_none());
    assert_eq!(service.calls(), 0);
}
