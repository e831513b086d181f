//! HTTP status endpoints (`/health`, `/metrics`).

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::{Deserialize, Serialize};

use crate::health::NetworkStatus;
use crate::metrics::MetricsSnapshot;
use crate::service::MonitoringService;

/// Overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every chain is healthy.
    Healthy,
    /// At least one chain is unhealthy.
    Unhealthy,
}

/// `/health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: OverallStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitoring: bool,
    pub chains: Vec<NetworkStatus>,
    pub transactions: MetricsSnapshot,
}

/// Prometheus metrics response (text format).
#[derive(Debug)]
pub struct PrometheusMetrics {
    pub content: String,
}

impl IntoResponse for PrometheusMetrics {
    fn into_response(self) -> axum::response::Response {
        (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            self.content,
        )
            .into_response()
    }
}

#[derive(Clone)]
struct EndpointState {
    service: Arc<MonitoringService>,
    started: Instant,
}

/// Build the status router for a service.
pub fn router(service: Arc<MonitoringService>) -> Router {
    let state = EndpointState {
        service,
        started: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<EndpointState>) -> impl IntoResponse {
    let chains = state.service.networks();
    let status = if chains.iter().all(|c| c.healthy) {
        OverallStatus::Healthy
    } else {
        OverallStatus::Unhealthy
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        monitoring: state.service.is_monitoring(),
        chains,
        transactions: state.service.get_metrics(),
    };

    let code = match status {
        OverallStatus::Healthy => StatusCode::OK,
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(response))
}

async fn metrics_handler(State(state): State<EndpointState>) -> PrometheusMetrics {
    PrometheusMetrics {
        content: state.service.export_metrics(),
    }
}
