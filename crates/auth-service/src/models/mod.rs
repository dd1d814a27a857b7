use chrono::{DateTime, Utc};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The database credential pair currently in force.
///
/// Readers always receive a whole pair behind an `Arc`; the username and
/// password are never observed from two different rotations.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub username: String,
    pub password: SecretString,
    pub fetched_at: DateTime<Utc>,
    /// Lease granted by the secrets provider, zero when unleased.
    pub lease_seconds: u64,
}

/// Short-lived single-use authorization code.
#[derive(Clone, Serialize, Deserialize, FromRow)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl AuthorizationCode {
    /// Unused and `now` strictly before expiry.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

impl std::fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCode")
            .field("code", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("used", &self.used)
            .finish()
    }
}

/// OAuth2 access token with its optional refresh token.
#[derive(Clone, Serialize, Deserialize, FromRow)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub user_id: Uuid,
    pub scope: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.access_expires_at
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.refresh_token, self.refresh_expires_at) {
            (Some(_), Some(exp)) => now < exp,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Registered third-party OAuth2 client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret_hash: String,
    pub redirect_uri: String,
    pub is_active: bool,
}

/// Login material for a first-party user.
#[derive(Clone, FromRow)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Token pair handed to a user on login or refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub user_id: Uuid,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGrant")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &"[REDACTED]")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// User token columns as they were before a rotation or logout, used to
/// evict the matching cache entries.
#[derive(Clone, FromRow)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
}

/// Cached view of a user access token.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionAccess {
    pub user_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
}

impl SessionAccess {
    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.access_expires_at
    }
}

/// Cached view of a user refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRefresh {
    pub user_id: Uuid,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Rows removed by one sweep of the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub authorization_codes: u64,
    pub tokens: u64,
    /// Users whose session columns were cleared.
    pub sessions: u64,
}

impl SweepCounts {
    pub fn total(&self) -> u64 {
        self.authorization_codes + self.tokens + self.sessions
    }
}
