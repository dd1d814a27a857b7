//! Token introspection for OAuth2 clients.

use auth_test_utils::{
    basic_auth, TestAuthServer, TestStack, TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_PASSWORD,
    TEST_SCOPE, TEST_USERNAME,
};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

async fn introspect(
    server: &TestAuthServer,
    authorization: Option<String>,
    token: &str,
) -> Result<(StatusCode, Value), anyhow::Error> {
    let mut request = reqwest::Client::new()
        .post(format!("{}/api/v1/oauth2/introspect", server.url()))
        .form(&[("token", token)]);
    if let Some(value) = authorization {
        request = request.header("authorization", value);
    }
    let response = request.send().await?;
    Ok((response.status(), response.json().await?))
}

#[tokio::test]
async fn test_introspect_active_oauth2_token() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let token = stack
        .lifecycle
        .issue_token(TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_SCOPE)
        .await?;
    let server = TestAuthServer::spawn(&stack).await?;

    let (status, body) =
        introspect(&server, Some(server.client_basic_auth()), &token.access_token).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["client_id"], TEST_CLIENT_ID);
    assert_eq!(body["user_id"], TEST_GRANT_USER_ID.to_string());
    assert_eq!(body["scope"], TEST_SCOPE);
    assert_eq!(body["exp"], token.access_expires_at.timestamp());
    Ok(())
}

#[tokio::test]
async fn test_introspect_expired_token_is_inactive() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let token = stack
        .lifecycle
        .issue_token(TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_SCOPE)
        .await?;
    let server = TestAuthServer::spawn(&stack).await?;

    // Exactly at expiry the token is no longer valid.
    stack.advance(Duration::from_secs(900));

    let (status, body) =
        introspect(&server, Some(server.client_basic_auth()), &token.access_token).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "active": false }));
    Ok(())
}

#[tokio::test]
async fn test_introspect_session_access_token() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let user_id = stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    let grant = stack.lifecycle.login(TEST_USERNAME, TEST_PASSWORD).await?;
    let server = TestAuthServer::spawn(&stack).await?;

    let (status, body) =
        introspect(&server, Some(server.client_basic_auth()), &grant.access_token).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["user_id"], user_id.to_string());
    assert!(body.get("client_id").is_none());
    Ok(())
}

#[tokio::test]
async fn test_introspect_unknown_token_is_inactive() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let server = TestAuthServer::spawn(&stack).await?;

    let (status, body) =
        introspect(&server, Some(server.client_basic_auth()), "never-issued").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "active": false }));
    Ok(())
}

#[tokio::test]
async fn test_introspect_requires_client_authentication() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let token = stack
        .lifecycle
        .issue_token(TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_SCOPE)
        .await?;
    let server = TestAuthServer::spawn(&stack).await?;

    let (status, body) = introspect(&server, None, &token.access_token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_GRANT");

    let (status, _) = introspect(
        &server,
        Some(basic_auth(TEST_CLIENT_ID, "wrong-secret")),
        &token.access_token,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = introspect(
        &server,
        Some(basic_auth("unknown-client", "whatever")),
        &token.access_token,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_introspect_after_revoke_is_inactive() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_client().await;
    let token = stack
        .lifecycle
        .issue_token(TEST_CLIENT_ID, TEST_GRANT_USER_ID, TEST_SCOPE)
        .await?;
    let server = TestAuthServer::spawn(&stack).await?;

    assert!(stack.lifecycle.revoke(&token.access_token).await?);

    let (_, body) =
        introspect(&server, Some(server.client_basic_auth()), &token.access_token).await?;
    assert_eq!(body["active"], false);
    Ok(())
}
