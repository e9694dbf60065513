// ============================================================================
// Health and Metrics Routes
// ============================================================================
//
// Endpoints:
// - GET /, /health   - Liveness
// - GET /health/ready - Readiness (probes both backends)
// - GET /metrics     - Prometheus metrics
//
// ============================================================================

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::AppContext;
use crate::gateway::Backend;

pub const SERVICE_NAME: &str = "video-gateway";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub services: BTreeMap<&'static str, bool>,
}

/// GET / and GET /health
pub async fn health_check(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: ctx.started_at.elapsed().as_secs(),
    })
}

/// GET /health/ready
pub async fn readiness(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let (auth_up, video_up) = tokio::join!(
        ctx.service_client.check_health(Backend::Auth),
        ctx.service_client.check_health(Backend::Video),
    );

    ctx.metrics.set_backend_up(Backend::Auth.name(), auth_up);
    ctx.metrics.set_backend_up(Backend::Video.name(), video_up);

    let services = BTreeMap::from([
        (Backend::Auth.name(), auth_up),
        (Backend::Video.name(), video_up),
    ]);

    if auth_up && video_up {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                services,
            }),
        )
    } else {
        tracing::warn!(auth = auth_up, video = video_up, "Gateway not ready");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "degraded",
                services,
            }),
        )
    }
}

/// GET /metrics
pub async fn metrics(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    match ctx.metrics.gather() {
        Ok(metrics_data) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics_data,
        ),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                "Internal Server Error".to_string(),
            )
        }
    }
}
