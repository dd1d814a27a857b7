//! Metrics definitions for the auth service.
//!
//! Prometheus naming: `auth_` prefix, `_total` for counters, `_seconds` for
//! duration histograms.
//!
//! # Cardinality
//!
//! Every label value comes from a fixed set in code:
//! - `kind`: authorization_code, access_token, refresh_token, session
//! - `status`: success, failure, invalid, fetch_failed, swap_failed
//! - `source`: cache, store
//! - `operation`: read, write, evict

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the process-wide Prometheus recorder.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("auth_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Swaps include up to three pings with backoff.
        .set_buckets_for_metric(
            Matcher::Prefix("auth_connection_swap".to_string()),
            &[0.010, 0.050, 0.100, 0.500, 1.000, 2.500, 5.000, 10.000, 20.000],
        )
        .map_err(|e| format!("Failed to set connection swap buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Metric: `auth_http_requests_total`, `auth_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    };

    histogram!("auth_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("auth_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Collapse unknown paths into one label value.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/auth/login" => "/api/v1/auth/login",
        "/api/v1/auth/refresh" => "/api/v1/auth/refresh",
        "/api/v1/auth/logout" => "/api/v1/auth/logout",
        "/api/v1/oauth2/introspect" => "/api/v1/oauth2/introspect",
        _ => "other",
    }
}

/// Metric: `auth_token_issuance_total`
/// Labels: `kind`, `status`
pub fn record_token_issuance(kind: &'static str, status: &'static str) {
    counter!("auth_token_issuance_total", "kind" => kind, "status" => status).increment(1);
}

/// Metric: `auth_token_validation_total`
/// Labels: `kind`, `status`, `source`
///
/// `source` is where the decision was made.
pub fn record_token_validation(kind: &'static str, status: &'static str, source: &'static str) {
    counter!("auth_token_validation_total",
        "kind" => kind,
        "status" => status,
        "source" => source
    )
    .increment(1);
}

/// Metric: `auth_cache_fallback_total`
/// Labels: `operation`
///
/// Cache operations that failed or were skipped while the cache was down.
pub fn record_cache_fallback(operation: &'static str) {
    counter!("auth_cache_fallback_total", "operation" => operation).increment(1);
}

/// Metric: `auth_credential_rotation_total`
/// Labels: `status`
pub fn record_credential_rotation(status: &'static str) {
    counter!("auth_credential_rotation_total", "status" => status).increment(1);
}

/// Metric: `auth_connection_swap_total`, `auth_connection_swap_duration_seconds`
/// Labels: `status`
///
/// Duration includes every verification ping and backoff.
pub fn record_connection_swap(status: &'static str, duration: Duration) {
    histogram!("auth_connection_swap_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("auth_connection_swap_total", "status" => status).increment(1);
}

/// Metric: `auth_health_status`
///
/// 0 healthy, 1 degraded, 2 unhealthy.
pub fn set_health_status(level: u8) {
    gauge!("auth_health_status").set(f64::from(level));
}

/// Metric: `auth_sweep_deleted_total`
/// Labels: `table`
pub fn record_sweep(authorization_codes: u64, tokens: u64, sessions: u64) {
    counter!("auth_sweep_deleted_total", "table" => "authorization_codes")
        .increment(authorization_codes);
    counter!("auth_sweep_deleted_total", "table" => "tokens").increment(tokens);
    counter!("auth_sweep_deleted_total", "table" => "user_sessions").increment(sessions);
}
