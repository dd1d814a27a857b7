//! HTTP routes.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::health::HealthMonitor;
use crate::lifecycle::TokenLifecycleManager;
use crate::middleware::http_metrics_middleware;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<TokenLifecycleManager>,
    pub health: Arc<HealthMonitor>,
}

/// Build the application routes.
///
/// - `/health` - Liveness probe
/// - `/ready` - Composite health report, 503 when unhealthy
/// - `/metrics` - Prometheus metrics
/// - `/api/v1/auth/{login,refresh,logout}` - Simple-auth sessions
/// - `/api/v1/oauth2/introspect` - Token introspection for OAuth2 clients
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/auth/login", post(handlers::login))
        .route("/api/v1/auth/refresh", post(handlers::refresh))
        .route("/api/v1/auth/logout", post(handlers::logout))
        .route("/api/v1/oauth2/introspect", post(handlers::introspect))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Metrics middleware is outermost so it also sees timeouts and
    // framework rejections.
    app_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
