//! Integration tests for the agent API endpoints

#[path = "../src/api.rs"]
#[allow(dead_code)]
mod api;

use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use observer_lib::{AgentMetrics, HealthState, RunOutcome, StatusRegistry};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const NODE_MONITOR: &str = "NodeObserver";
const CLUSTER_MONITOR: &str = "ClusterObserver";

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let status = StatusRegistry::new();
    status.register_monitor(NODE_MONITOR).await;
    status.register_monitor(CLUSTER_MONITOR).await;

    let metrics = AgentMetrics::new();
    let state = Arc::new(AppState::new(status, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_lists_registered_monitors() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["running"], false);
    assert_eq!(health["monitors"][NODE_MONITOR]["runs"], 0);
    assert!(health["monitors"][CLUSTER_MONITOR].is_object());
    assert_eq!(health["submitter"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_monitor_failed() {
    let (app, state) = setup_test_app().await;

    state
        .status
        .record_run(
            NODE_MONITOR,
            RunOutcome::Failed,
            Duration::from_millis(12),
            Some("sample provider unavailable".to_string()),
        )
        .await;

    // A failed monitor runs again next iteration, so the agent stays live
    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    let record = &health["monitors"][NODE_MONITOR];
    assert_eq!(record["last_outcome"], "failed");
    assert_eq!(record["failures"], 1);
    assert_eq!(record["last_duration_ms"], 12);
    assert_eq!(record["message"], "sample provider unavailable");
}

#[tokio::test]
async fn test_healthz_returns_503_when_monitor_hung() {
    let (app, state) = setup_test_app().await;

    state
        .status
        .record_run(
            CLUSTER_MONITOR,
            RunOutcome::Hung,
            Duration::from_secs(600),
            Some("Exceeded execution timeout of 600s".to_string()),
        )
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert!(health["monitors"][CLUSTER_MONITOR]["hung_since"].is_string());
}

#[tokio::test]
async fn test_healthz_shows_rejected_submissions() {
    let (app, state) = setup_test_app().await;

    state
        .status
        .record_submission_failure("health endpoint returned 403 Forbidden")
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["submitter"]["status"], "degraded");
    assert_eq!(health["submitter"]["consecutive_failures"], 1);
    assert_eq!(
        health["submitter"]["last_error"],
        "health endpoint returned 403 Forbidden"
    );
}

#[tokio::test]
async fn test_readyz_returns_503_before_run_loop_starts() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Run-loop not running");
}

#[tokio::test]
async fn test_readyz_returns_ok_while_running() {
    let (app, state) = setup_test_app().await;
    state.status.set_running(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
    assert!(readiness.get("reason").is_none());
}

#[tokio::test]
async fn test_readyz_names_hung_monitor() {
    let (app, state) = setup_test_app().await;
    state.status.set_running(true).await;
    state
        .status
        .record_run(NODE_MONITOR, RunOutcome::Hung, Duration::from_secs(600), None)
        .await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["reason"], "Monitor NodeObserver is hung");
}

#[tokio::test]
async fn test_monitor_status_route() {
    let (app, state) = setup_test_app().await;
    state
        .status
        .record_run(NODE_MONITOR, RunOutcome::Completed, Duration::from_millis(3), None)
        .await;

    let (status, record) = get_json(app.clone(), "/monitors/NodeObserver").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "healthy");
    assert_eq!(record["runs"], 1);
    assert_eq!(record["last_outcome"], "completed");

    let (status, _) = get(app, "/monitors/Missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state
        .metrics
        .observe_cycle_latency(NODE_MONITOR, Duration::from_millis(250));
    state
        .metrics
        .inc_health_reports(NODE_MONITOR, HealthState::Warning);
    state.metrics.inc_samples_collected("CPU %");
    state.metrics.set_series_average("CPU %", "node", 42.5);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("node_observer_monitor_cycle_seconds"));
    assert!(metrics_text.contains("node_observer_health_reports_total"));
    assert!(metrics_text.contains("node_observer_samples_collected_total"));
    assert!(metrics_text.contains("node_observer_series_average"));
    assert!(metrics_text.contains("node_observer_hung_monitors"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, state) = setup_test_app().await;

    state
        .metrics
        .observe_cycle_latency(CLUSTER_MONITOR, Duration::from_secs(2));

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let metrics_text = String::from_utf8(body).unwrap();
    assert!(metrics_text.contains("node_observer_monitor_cycle_seconds_bucket"));
    assert!(metrics_text.contains("node_observer_monitor_cycle_seconds_count"));
    assert!(metrics_text.contains("node_observer_monitor_cycle_seconds_sum"));
}
