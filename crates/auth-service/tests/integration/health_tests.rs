//! Liveness, readiness and metrics endpoints.

use auth_test_utils::{TestAuthServer, TestStack};
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    let server = TestAuthServer::spawn(&stack).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");
    Ok(())
}

#[tokio::test]
async fn test_ready_reports_healthy_when_both_dependencies_up() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    let server = TestAuthServer::spawn(&stack).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["redis"], "connected");
    assert_eq!(body["timestamp"], "2025-06-15T15:06:40Z");
    Ok(())
}

#[tokio::test]
async fn test_ready_reports_degraded_but_serving_when_cache_down() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    let server = TestAuthServer::spawn(&stack).await?;
    stack.cache.set_available(false);

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(
        response.status(),
        StatusCode::OK,
        "A cache outage must not take the service out of rotation"
    );
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["redis"], "error");
    Ok(())
}

#[tokio::test]
async fn test_ready_returns_503_when_store_down() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    let server = TestAuthServer::spawn(&stack).await?;
    stack.store.set_available(false);

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"], "error");

    // Liveness is unaffected.
    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_renders() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    let server = TestAuthServer::spawn(&stack).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
