//! Simple-auth login, refresh and logout over HTTP.

use auth_test_utils::{TestAuthServer, TestStack, TEST_PASSWORD, TEST_USERNAME};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn post_json(
    client: &reqwest::Client,
    url: String,
    body: Value,
) -> Result<(StatusCode, Value), anyhow::Error> {
    let response = client.post(url).json(&body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)?
    };
    Ok((status, body))
}

#[tokio::test]
async fn test_login_returns_session_tokens() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    let server = TestAuthServer::spawn(&stack).await?;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        format!("{}/api/v1/auth/login", server.url()),
        json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["refresh_expires_in"], 86_400);
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    Ok(())
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    let server = TestAuthServer::spawn(&stack).await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/auth/login", server.url());

    let (wrong_status, wrong_body) = post_json(
        &client,
        url.clone(),
        json!({ "username": TEST_USERNAME, "password": "not-the-password" }),
    )
    .await?;
    let (unknown_status, unknown_body) = post_json(
        &client,
        url,
        json!({ "username": "nobody", "password": TEST_PASSWORD }),
    )
    .await?;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, unknown_status);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["error"]["code"], "INVALID_GRANT");
    Ok(())
}

#[tokio::test]
async fn test_refresh_rotates_and_retires_old_token() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    let server = TestAuthServer::spawn(&stack).await?;
    let client = reqwest::Client::new();

    let (_, login) = post_json(
        &client,
        format!("{}/api/v1/auth/login", server.url()),
        json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }),
    )
    .await?;
    let first_refresh = login["refresh_token"].clone();

    let (status, rotated) = post_json(
        &client,
        format!("{}/api/v1/auth/refresh", server.url()),
        json!({ "refresh_token": first_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], first_refresh);
    assert_ne!(rotated["access_token"], login["access_token"]);

    let (status, body) = post_json(
        &client,
        format!("{}/api/v1/auth/refresh", server.url()),
        json!({ "refresh_token": first_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "old refresh token must be dead");
    assert_eq!(body["error"]["code"], "INVALID_GRANT");
    Ok(())
}

#[tokio::test]
async fn test_logout_revokes_refresh_and_is_idempotent() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    let server = TestAuthServer::spawn(&stack).await?;
    let client = reqwest::Client::new();

    let (_, login) = post_json(
        &client,
        format!("{}/api/v1/auth/login", server.url()),
        json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }),
    )
    .await?;
    let refresh = login["refresh_token"].clone();
    let logout_url = format!("{}/api/v1/auth/logout", server.url());

    let (status, _) = post_json(&client, logout_url.clone(), json!({ "refresh_token": refresh })).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = post_json(&client, logout_url, json!({ "refresh_token": refresh })).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = post_json(
        &client,
        format!("{}/api/v1/auth/refresh", server.url()),
        json!({ "refresh_token": refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_refresh_fails_after_expiry() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
    let server = TestAuthServer::spawn(&stack).await?;
    let client = reqwest::Client::new();

    let (_, login) = post_json(
        &client,
        format!("{}/api/v1/auth/login", server.url()),
        json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }),
    )
    .await?;

    stack.advance(std::time::Duration::from_secs(86_400));

    let (status, _) = post_json(
        &client,
        format!("{}/api/v1/auth/refresh", server.url()),
        json!({ "refresh_token": login["refresh_token"] }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_rejected() -> Result<(), anyhow::Error> {
    let stack = TestStack::new();
    let server = TestAuthServer::spawn(&stack).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({ "username": TEST_USERNAME }))
        .send()
        .await?;

    assert!(response.status().is_client_error());
    Ok(())
}
