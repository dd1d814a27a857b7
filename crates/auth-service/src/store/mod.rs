//! Durable relational store.
//!
//! Source of truth for users, OAuth2 clients, authorization codes and
//! tokens. Single-use and single-session guarantees are enforced here with
//! conditional updates, never with an in-process lock, so they hold across
//! process instances.

mod pg;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use pg::PgStore;

use crate::errors::AuthError;
use crate::models::{
    AuthorizationCode, OAuthClient, SessionAccess, SessionGrant, SessionRecord, SessionRefresh,
    SweepCounts, Token, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Row-level access for the token lifecycle.
///
/// Every method fails with [`AuthError::DurableStoreUnavailable`] when the
/// store cannot be reached. "Not found" is `Ok(None)`.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn ping(&self) -> Result<(), AuthError>;

    // Authorization codes

    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError>;

    /// Code matching `code AND NOT used AND expires_at > now`.
    async fn find_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, AuthError>;

    /// Atomically flip `used` from false to true under the same predicate as
    /// [`find_authorization_code`](Self::find_authorization_code). Of any
    /// number of concurrent callers for one code at most one gets `Some`.
    async fn consume_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, AuthError>;

    async fn delete_authorization_code(&self, code: &str) -> Result<bool, AuthError>;

    // OAuth2 tokens

    async fn insert_token(&self, token: &Token) -> Result<(), AuthError>;

    async fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, AuthError>;

    async fn find_token_by_refresh(&self, refresh_token: &str)
        -> Result<Option<Token>, AuthError>;

    /// Delete the row holding a live `old_refresh` and insert `new` in one
    /// transaction. Returns the deleted row, or `None` (and changes nothing)
    /// if no live row matched.
    async fn replace_token(
        &self,
        old_refresh: &str,
        new: &Token,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, AuthError>;

    async fn delete_token_by_access(&self, access_token: &str)
        -> Result<Option<Token>, AuthError>;

    async fn delete_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, AuthError>;

    // OAuth2 clients

    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, AuthError>;

    async fn upsert_client(&self, client: &OAuthClient) -> Result<(), AuthError>;

    // First-party users

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AuthError>;

    /// Overwrite the user's session columns with `grant`. Returns the
    /// previous values.
    async fn record_login(&self, grant: &SessionGrant) -> Result<Option<SessionRecord>, AuthError>;

    /// Replace the session only if the user still holds a live
    /// `old_refresh`. Returns the previous values on success.
    async fn rotate_user_session(
        &self,
        old_refresh: &str,
        grant: &SessionGrant,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AuthError>;

    async fn find_session_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<SessionAccess>, AuthError>;

    async fn find_session_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRefresh>, AuthError>;

    /// Null out the session holding `refresh_token`. Returns the previous
    /// values.
    async fn clear_user_session(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRecord>, AuthError>;

    /// Delete used or expired codes and fully expired tokens.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<SweepCounts, AuthError>;
}
