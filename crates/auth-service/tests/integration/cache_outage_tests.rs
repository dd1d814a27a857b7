//! Degraded mode: the cache is down, the durable store carries all traffic.

use auth_test_utils::{
    TestAuthServer, TestStack, TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_PASSWORD, TEST_SCOPE,
    TEST_USERNAME,
};
use auth_service::errors::AuthError;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn test_token_issued_before_outage_still_validates() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let token = stack
        .lifecycle
        .issue_token(TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_SCOPE)
        .await?;

    stack.cache.set_available(false);

    let validated = stack.lifecycle.validate_access_token(&token.access_token).await?;
    assert_eq!(validated.client_id, TEST_CLIENT_ID);
    Ok(())
}

#[tokio::test]
async fn test_full_session_flow_while_cache_down() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    stack.cache.set_available(false);
    let server = TestAuthServer::spawn(&stack).await?;
    let client = reqwest::Client::new();

    let login: Value = client
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let response = client
        .post(format!("{}/api/v1/auth/refresh", server.url()))
        .json(&json!({ "refresh_token": login["refresh_token"] }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let session = stack
        .lifecycle
        .validate_session_access_token(
            response.json::<Value>().await?["access_token"]
                .as_str()
                .unwrap_or_default(),
        )
        .await;
    assert!(session.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_code_consumed_during_outage_stays_consumed_after_recovery(
) -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let code = stack
        .lifecycle
        .issue_authorization_code(
            TEST_CLIENT_ID,
            TEST_GRANT_USER_ID,
            auth_test_utils::TEST_REDIRECT_URI,
            TEST_SCOPE,
        )
        .await?;

    stack.cache.set_available(false);
    stack.lifecycle.consume_authorization_code(&code.code).await?;

    // The cache still holds the unused copy written at issue time.
    stack.cache.set_available(true);
    let err = stack
        .lifecycle
        .consume_authorization_code(&code.code)
        .await
        .err();
    assert!(matches!(err, Some(AuthError::CodeInvalidOrExpired)));
    Ok(())
}

#[tokio::test]
async fn test_store_outage_surfaces_as_503() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    stack.store.set_available(false);
    let server = TestAuthServer::spawn(&stack).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    Ok(())
}
