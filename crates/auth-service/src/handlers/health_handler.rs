use crate::health::Status;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// Liveness probe. Checks no dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe.
///
/// Returns the composite health report. A degraded service (cache down)
/// still serves traffic through the durable store, so only `unhealthy`
/// maps to 503.
#[tracing::instrument(skip_all, name = "auth.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health.probe().await;

    let status = match report.status {
        Status::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        Status::Healthy | Status::Degraded => StatusCode::OK,
    };

    (status, Json(report))
}
