use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Secrets provider unreachable when credentials were required.
    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    /// A rotated credential pair could not be verified against the store.
    #[error("Connection swap failed: {0}")]
    ConnectionSwapFailed(String),

    #[error("Authorization code invalid or expired")]
    CodeInvalidOrExpired,

    #[error("Token invalid or expired")]
    TokenInvalidOrExpired,

    /// Cache unreachable. Absorbed by the lifecycle; requests fall through
    /// to the durable store.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Durable store unavailable: {0}")]
    DurableStoreUnavailable(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Expected outcomes of validating caller-supplied material.
    ///
    /// These are returned to the caller and never logged as errors.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            AuthError::CodeInvalidOrExpired
                | AuthError::TokenInvalidOrExpired
                | AuthError::InvalidCredentials
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Validation failures share one body so callers cannot tell unknown,
        // expired and already-used material apart.
        let (status, code, message) = match &self {
            AuthError::CodeInvalidOrExpired
            | AuthError::TokenInvalidOrExpired
            | AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_GRANT",
                "Invalid credentials or token",
            ),
            AuthError::DurableStoreUnavailable(_)
            | AuthError::CredentialsUnavailable(_)
            | AuthError::CacheUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service dependencies unavailable",
            ),
            AuthError::Timeout(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "TIMEOUT",
                "The request could not be completed in time",
            ),
            AuthError::ConnectionSwapFailed(_)
            | AuthError::Configuration(_)
            | AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_failures_are_indistinguishable() {
        let (s1, b1) = body_of(AuthError::CodeInvalidOrExpired).await;
        let (s2, b2) = body_of(AuthError::TokenInvalidOrExpired).await;
        let (s3, b3) = body_of(AuthError::InvalidCredentials).await;

        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s1, s2);
        assert_eq!(s2, s3);
        assert_eq!(b1, b2);
        assert_eq!(b2, b3);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_leak_details() {
        let (status, body) =
            body_of(AuthError::DurableStoreUnavailable("pg at 10.0.0.5 refused".into())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(!message.contains("10.0.0.5"));
    }

    #[test]
    fn test_is_validation_failure() {
        assert!(AuthError::CodeInvalidOrExpired.is_validation_failure());
        assert!(AuthError::TokenInvalidOrExpired.is_validation_failure());
        assert!(AuthError::InvalidCredentials.is_validation_failure());
        assert!(!AuthError::CacheUnavailable("x".into()).is_validation_failure());
        assert!(!AuthError::DurableStoreUnavailable("x".into()).is_validation_failure());
    }
}
