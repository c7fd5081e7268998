//! HTTP API: liveness, readiness, per-monitor run status and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use observer_lib::{AgentMetrics, ComponentStatus, StatusRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub status: StatusRegistry,
    pub metrics: AgentMetrics,
}

impl AppState {
    pub fn new(status: StatusRegistry, metrics: AgentMetrics) -> Self {
        Self { status, metrics }
    }
}

/// JSON body with 200 when `pass`, 503 otherwise
fn status_json<T: Serialize>(pass: bool, body: T) -> Response {
    let code = if pass {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// Every monitor's last run and the submitter state; fails once a
/// monitor has hung
async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let report = state.status.report().await;
    status_json(report.status != ComponentStatus::Unhealthy, report)
}

async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.status.readiness().await;
    status_json(readiness.ready, readiness)
}

async fn monitor_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.status.monitor(&name).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            format!("No monitor named {}", name),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/monitors/:name", get(monitor_status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
