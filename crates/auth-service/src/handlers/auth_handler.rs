use crate::errors::AuthError;
use crate::routes::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Form, Json,
};
use base64::{engine::general_purpose, Engine as _};
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: SecretString,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
}

/// Token introspection request (RFC 7662, form encoded).
#[derive(Deserialize)]
pub struct IntrospectRequest {
    pub token: SecretString,
    /// Accepted for compatibility. Both token kinds are always checked.
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl IntrospectResponse {
    fn inactive() -> Self {
        Self::default()
    }
}

fn session_response(state: &AppState, grant: crate::models::SessionGrant) -> SessionResponse {
    let settings = state.lifecycle.settings();
    SessionResponse {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        token_type: "Bearer",
        expires_in: settings.access_ttl.as_secs(),
        refresh_expires_in: settings.refresh_ttl.as_secs(),
    }
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AuthError> {
    let grant = state
        .lifecycle
        .login(&payload.username, payload.password.expose_secret())
        .await?;

    Ok(Json(session_response(&state, grant)))
}

/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<SessionResponse>, AuthError> {
    let grant = state
        .lifecycle
        .refresh(payload.refresh_token.expose_secret())
        .await?;

    Ok(Json(session_response(&state, grant)))
}

/// POST /api/v1/auth/logout
///
/// Succeeds for unknown tokens too.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    state
        .lifecycle
        .logout(payload.refresh_token.expose_secret())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/oauth2/introspect
///
/// The caller authenticates as an OAuth2 client with HTTP Basic auth.
/// OAuth2 access tokens are checked first, then simple-auth session access
/// tokens. Anything that fails validation reports `{"active": false}`.
pub async fn introspect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(payload): Form<IntrospectRequest>,
) -> Result<Json<IntrospectResponse>, AuthError> {
    let (client_id, client_secret) = extract_client_credentials(&headers)?;
    state
        .lifecycle
        .authenticate_client(&client_id, client_secret.expose_secret())
        .await?;

    let token = payload.token.expose_secret();
    if let Some(active) = introspect_oauth2(&state, token).await? {
        return Ok(Json(active));
    }

    match state.lifecycle.validate_session_access_token(token).await {
        Ok(session) => Ok(Json(IntrospectResponse {
            active: true,
            client_id: None,
            user_id: Some(session.user_id),
            scope: None,
            exp: Some(session.access_expires_at.timestamp()),
        })),
        Err(e) if e.is_validation_failure() => Ok(Json(IntrospectResponse::inactive())),
        Err(e) => Err(e),
    }
}

async fn introspect_oauth2(
    state: &AppState,
    token: &str,
) -> Result<Option<IntrospectResponse>, AuthError> {
    match state.lifecycle.validate_access_token(token).await {
        Ok(token) => Ok(Some(IntrospectResponse {
            active: true,
            client_id: Some(token.client_id),
            user_id: Some(token.user_id),
            scope: Some(token.scope),
            exp: Some(token.access_expires_at.timestamp()),
        })),
        Err(e) if e.is_validation_failure() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Extract client credentials from the Basic Auth header.
fn extract_client_credentials(headers: &HeaderMap) -> Result<(String, SecretString), AuthError> {
    let auth_str = headers
        .get("authorization")
        .ok_or(AuthError::InvalidCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidCredentials)?;

    let basic_auth = auth_str
        .strip_prefix("Basic ")
        .ok_or(AuthError::InvalidCredentials)?;

    let decoded = general_purpose::STANDARD
        .decode(basic_auth)
        .map_err(|_| AuthError::InvalidCredentials)?;

    let credentials = String::from_utf8(decoded).map_err(|_| AuthError::InvalidCredentials)?;

    match credentials.split_once(':') {
        Some((id, secret)) if !id.is_empty() => Ok((id.to_string(), SecretString::from(secret))),
        _ => Err(AuthError::InvalidCredentials),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", general_purpose::STANDARD.encode(raw));
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_extract_client_credentials_basic_auth() {
        let (id, secret) = extract_client_credentials(&basic("client-1:s3cr:et")).unwrap();
        assert_eq!(id, "client-1");
        assert_eq!(secret.expose_secret(), "s3cr:et");
    }

    #[test]
    fn test_extract_client_credentials_rejects_malformed() {
        assert!(extract_client_credentials(&HeaderMap::new()).is_err());
        assert!(extract_client_credentials(&basic("no-colon")).is_err());
        assert!(extract_client_credentials(&basic(":secret")).is_err());

        let mut bearer = HeaderMap::new();
        bearer.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert!(extract_client_credentials(&bearer).is_err());

        let mut garbage = HeaderMap::new();
        garbage.insert("authorization", HeaderValue::from_static("Basic !!!"));
        assert!(extract_client_credentials(&garbage).is_err());
    }

    #[test]
    fn test_inactive_response_has_only_active_field() {
        let json = serde_json::to_value(IntrospectResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }
}
