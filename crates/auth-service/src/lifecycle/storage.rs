//! Storage contract for an external OAuth2 protocol engine.
//!
//! The engine owns grant semantics and calls into this trait to persist and
//! look up what it issues. [`TokenLifecycleManager`] implements it, so every
//! engine call gets the same cache/store precedence and expiry rules as the
//! rest of the service.

use super::TokenLifecycleManager;
use crate::errors::AuthError;
use crate::models::{AuthorizationCode, OAuthClient, Token};
use async_trait::async_trait;

#[async_trait]
pub trait OAuth2Storage: Send + Sync {
    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>, AuthError>;

    async fn save_authorize(&self, code: &AuthorizationCode) -> Result<(), AuthError>;

    /// Redeemable code, without consuming it.
    async fn get_authorize(&self, code: &str) -> Result<AuthorizationCode, AuthError>;

    async fn remove_authorize(&self, code: &str) -> Result<(), AuthError>;

    async fn save_access(&self, token: &Token) -> Result<(), AuthError>;

    async fn get_access(&self, access_token: &str) -> Result<Token, AuthError>;

    async fn get_refresh(&self, refresh_token: &str) -> Result<Token, AuthError>;

    async fn remove_access(&self, access_token: &str) -> Result<(), AuthError>;

    async fn remove_refresh(&self, refresh_token: &str) -> Result<(), AuthError>;
}

#[async_trait]
impl OAuth2Storage for TokenLifecycleManager {
    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>, AuthError> {
        TokenLifecycleManager::get_client(self, client_id).await
    }

    async fn save_authorize(&self, code: &AuthorizationCode) -> Result<(), AuthError> {
        self.save_authorization_code(code).await
    }

    async fn get_authorize(&self, code: &str) -> Result<AuthorizationCode, AuthError> {
        self.get_authorization_code(code).await
    }

    async fn remove_authorize(&self, code: &str) -> Result<(), AuthError> {
        self.delete_authorization_code(code).await.map(|_| ())
    }

    async fn save_access(&self, token: &Token) -> Result<(), AuthError> {
        self.save_token(token).await
    }

    async fn get_access(&self, access_token: &str) -> Result<Token, AuthError> {
        self.validate_access_token(access_token).await
    }

    async fn get_refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        self.validate_refresh_token(refresh_token).await
    }

    async fn remove_access(&self, access_token: &str) -> Result<(), AuthError> {
        TokenLifecycleManager::remove_access(self, access_token)
            .await
            .map(|_| ())
    }

    async fn remove_refresh(&self, refresh_token: &str) -> Result<(), AuthError> {
        TokenLifecycleManager::remove_refresh(self, refresh_token)
            .await
            .map(|_| ())
    }
}
