//! Token and authorization code lifecycle.
//!
//! [`TokenLifecycleManager`] is the single path for issuing, validating and
//! revoking authorization codes and tokens. Writes land in the durable store
//! first and are mirrored to the cache; reads try the cache first and fall
//! back to the store. A cache outage therefore costs latency, never
//! correctness.
//!
//! Expiry is a half-open interval: material is valid for `now < expires_at`.

mod cache_aside;
mod session;
mod storage;

pub use storage::OAuth2Storage;

use crate::cache::{keys, CacheStore};
use crate::clock::Clock;
use crate::config::{TokenSettings, DEFAULT_BCRYPT_COST};
use crate::crypto::{self, DUMMY_PASSWORD_HASH, TOKEN_BYTES};
use crate::errors::AuthError;
use crate::health::HealthMonitor;
use crate::models::{AuthorizationCode, OAuthClient, SweepCounts, Token};
use crate::observability::{hash_for_correlation, metrics};
use crate::store::DurableStore;
use cache_aside::CachePath;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const AUTH_CODE: &str = "authorization_code";
const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";

pub struct TokenLifecycleManager {
    cache: CachePath,
    store: Arc<dyn DurableStore>,
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    bcrypt_cost: u32,
}

impl TokenLifecycleManager {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn DurableStore>,
        health: Arc<HealthMonitor>,
        settings: TokenSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: CachePath::new(cache, health),
            store,
            settings,
            clock,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    /// Deadline applied to every durable store call.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    async fn durable<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    target: "auth.lifecycle",
                    operation,
                    timeout_ms = self.store_timeout.as_millis(),
                    "Durable store call timed out"
                );
                Err(AuthError::Timeout(format!("{} exceeded deadline", operation)))
            }
        }
    }

    fn expiry(&self, now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::Configuration(format!("TTL out of range: {:?}", ttl)))
    }

    // ------------------------------------------------------------------
    // Authorization codes
    // ------------------------------------------------------------------

    /// Issue a single-use authorization code.
    #[instrument(skip_all, fields(client = %hash_for_correlation(client_id)))]
    pub async fn issue_authorization_code(
        &self,
        client_id: &str,
        user_id: Uuid,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let now = self.clock.now();
        let code = AuthorizationCode {
            code: crypto::generate_token(self.settings.code_length)?,
            client_id: client_id.to_string(),
            user_id,
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            expires_at: self.expiry(now, self.settings.code_ttl)?,
            used: false,
        };

        self.save_authorization_code(&code).await?;
        Ok(code)
    }

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError> {
        if let Err(e) = self
            .durable("insert_authorization_code", self.store.insert_authorization_code(code))
            .await
        {
            metrics::record_token_issuance(AUTH_CODE, "failure");
            error!(target: "auth.lifecycle", error = %e, "Failed to persist authorization code");
            return Err(e);
        }

        let now = self.clock.now();
        self.cache
            .write(&keys::authorization_code(&code.code), code, code.expires_at, now)
            .await;

        metrics::record_token_issuance(AUTH_CODE, "success");
        debug!(target: "auth.lifecycle", expires_at = %code.expires_at, "Authorization code issued");
        Ok(())
    }

    /// Redeem a code.
    ///
    /// At most one call per code ever succeeds. The durable store's
    /// conditional update decides; a cached copy can only short-circuit a
    /// rejection.
    #[instrument(skip_all)]
    pub async fn consume_authorization_code(
        &self,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let now = self.clock.now();
        let key = keys::authorization_code(code);

        if let Some(cached) = self.cache.read::<AuthorizationCode>(&key).await {
            if cached.code != code || !cached.is_redeemable_at(now) {
                self.cache.evict(&key).await;
                metrics::record_token_validation(AUTH_CODE, "invalid", "cache");
                return Err(AuthError::CodeInvalidOrExpired);
            }
        }

        let consumed = self
            .durable(
                "consume_authorization_code",
                self.store.consume_authorization_code(code, now),
            )
            .await;

        // Whatever the outcome the cached copy is no longer useful.
        self.cache.evict(&key).await;

        match consumed? {
            Some(row) => {
                metrics::record_token_validation(AUTH_CODE, "success", "store");
                debug!(
                    target: "auth.lifecycle",
                    client = %hash_for_correlation(&row.client_id),
                    "Authorization code consumed"
                );
                Ok(row)
            }
            None => {
                metrics::record_token_validation(AUTH_CODE, "invalid", "store");
                Err(AuthError::CodeInvalidOrExpired)
            }
        }
    }

    /// Look up a redeemable code without consuming it.
    pub async fn get_authorization_code(
        &self,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let now = self.clock.now();
        let key = keys::authorization_code(code);

        if let Some(cached) = self.cache.read::<AuthorizationCode>(&key).await {
            if cached.code == code && cached.is_redeemable_at(now) {
                return Ok(cached);
            }
        }

        let row = self
            .durable(
                "find_authorization_code",
                self.store.find_authorization_code(code, now),
            )
            .await?
            .ok_or(AuthError::CodeInvalidOrExpired)?;

        self.cache.write(&key, &row, row.expires_at, now).await;
        Ok(row)
    }

    /// Delete a code outright.
    pub async fn delete_authorization_code(&self, code: &str) -> Result<bool, AuthError> {
        let deleted = self
            .durable(
                "delete_authorization_code",
                self.store.delete_authorization_code(code),
            )
            .await?;
        self.cache.evict(&keys::authorization_code(code)).await;
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // OAuth2 tokens
    // ------------------------------------------------------------------

    /// Mint and persist a token. A refresh token is included when refresh
    /// issuance is enabled.
    #[instrument(skip_all, fields(client = %hash_for_correlation(client_id)))]
    pub async fn issue_token(
        &self,
        client_id: &str,
        user_id: Uuid,
        scope: &str,
    ) -> Result<Token, AuthError> {
        let token = self.mint_token(
            client_id,
            user_id,
            scope,
            self.settings.issue_refresh_tokens,
        )?;
        self.save_token(&token).await?;
        Ok(token)
    }

    fn mint_token(
        &self,
        client_id: &str,
        user_id: Uuid,
        scope: &str,
        with_refresh: bool,
    ) -> Result<Token, AuthError> {
        let now = self.clock.now();
        let (refresh_token, refresh_expires_at) = if with_refresh {
            (
                Some(crypto::generate_token(TOKEN_BYTES)?),
                Some(self.expiry(now, self.settings.refresh_ttl)?),
            )
        } else {
            (None, None)
        };

        Ok(Token {
            access_token: crypto::generate_token(TOKEN_BYTES)?,
            refresh_token,
            client_id: client_id.to_string(),
            user_id,
            scope: scope.to_string(),
            access_expires_at: self.expiry(now, self.settings.access_ttl)?,
            refresh_expires_at,
        })
    }

    /// Persist a token built elsewhere and mirror it to the cache.
    pub async fn save_token(&self, token: &Token) -> Result<(), AuthError> {
        if let Err(e) = self
            .durable("insert_token", self.store.insert_token(token))
            .await
        {
            metrics::record_token_issuance(ACCESS_TOKEN, "failure");
            error!(target: "auth.lifecycle", error = %e, "Failed to persist token");
            return Err(e);
        }

        self.mirror_token(token).await;
        metrics::record_token_issuance(ACCESS_TOKEN, "success");
        Ok(())
    }

    /// Cache the token under each of its keys with that key's own expiry.
    async fn mirror_token(&self, token: &Token) {
        let now = self.clock.now();
        self.cache
            .write(
                &keys::access_token(&token.access_token),
                token,
                token.access_expires_at,
                now,
            )
            .await;

        if let (Some(refresh), Some(expires_at)) = (&token.refresh_token, token.refresh_expires_at)
        {
            self.cache
                .write(&keys::refresh_token(refresh), token, expires_at, now)
                .await;
        }
    }

    async fn evict_token(&self, token: &Token) {
        self.cache
            .evict(&keys::access_token(&token.access_token))
            .await;
        if let Some(refresh) = &token.refresh_token {
            self.cache.evict(&keys::refresh_token(refresh)).await;
        }
    }

    /// Valid iff a row exists for `access_token` and `now < access_expires_at`.
    #[instrument(skip_all)]
    pub async fn validate_access_token(&self, access_token: &str) -> Result<Token, AuthError> {
        let now = self.clock.now();
        let key = keys::access_token(access_token);

        if let Some(cached) = self.cache.read::<Token>(&key).await {
            // Re-check expiry in case the cache TTL outlived the row's.
            if cached.access_token == access_token && cached.access_valid_at(now) {
                metrics::record_token_validation(ACCESS_TOKEN, "success", "cache");
                return Ok(cached);
            }
            self.cache.evict(&key).await;
        }

        let row = self
            .durable(
                "find_token_by_access",
                self.store.find_token_by_access(access_token),
            )
            .await?;

        match row {
            Some(token) if token.access_valid_at(now) => {
                self.cache
                    .write(&key, &token, token.access_expires_at, now)
                    .await;
                metrics::record_token_validation(ACCESS_TOKEN, "success", "store");
                Ok(token)
            }
            _ => {
                metrics::record_token_validation(ACCESS_TOKEN, "invalid", "store");
                Err(AuthError::TokenInvalidOrExpired)
            }
        }
    }

    /// Valid iff a row exists for `refresh_token` and
    /// `now < refresh_expires_at`.
    #[instrument(skip_all)]
    pub async fn validate_refresh_token(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let now = self.clock.now();
        let key = keys::refresh_token(refresh_token);

        if let Some(cached) = self.cache.read::<Token>(&key).await {
            if cached.refresh_token.as_deref() == Some(refresh_token)
                && cached.refresh_valid_at(now)
            {
                metrics::record_token_validation(REFRESH_TOKEN, "success", "cache");
                return Ok(cached);
            }
            self.cache.evict(&key).await;
        }

        let row = self
            .durable(
                "find_token_by_refresh",
                self.store.find_token_by_refresh(refresh_token),
            )
            .await?;

        match row {
            Some(token) if token.refresh_valid_at(now) => {
                if let Some(expires_at) = token.refresh_expires_at {
                    self.cache.write(&key, &token, expires_at, now).await;
                }
                metrics::record_token_validation(REFRESH_TOKEN, "success", "store");
                Ok(token)
            }
            _ => {
                metrics::record_token_validation(REFRESH_TOKEN, "invalid", "store");
                Err(AuthError::TokenInvalidOrExpired)
            }
        }
    }

    /// Exchange a live refresh token for a new token.
    ///
    /// The old row is deleted and the new one inserted in one durable
    /// transaction, so the old refresh token stops working exactly when the
    /// new one starts.
    #[instrument(skip_all)]
    pub async fn rotate_refresh_token(&self, old_refresh: &str) -> Result<Token, AuthError> {
        let current = self.validate_refresh_token(old_refresh).await?;
        let new = self.mint_token(&current.client_id, current.user_id, &current.scope, true)?;
        let now = self.clock.now();

        let replaced = self
            .durable(
                "replace_token",
                self.store.replace_token(old_refresh, &new, now),
            )
            .await?;

        let Some(old) = replaced else {
            // Another caller rotated or revoked it between validation and
            // the transaction.
            self.cache.evict(&keys::refresh_token(old_refresh)).await;
            metrics::record_token_issuance(REFRESH_TOKEN, "invalid");
            return Err(AuthError::TokenInvalidOrExpired);
        };

        self.evict_token(&old).await;
        self.mirror_token(&new).await;
        metrics::record_token_issuance(REFRESH_TOKEN, "success");
        debug!(
            target: "auth.lifecycle",
            client = %hash_for_correlation(&new.client_id),
            "Refresh token rotated"
        );

        Ok(new)
    }

    /// Revoke by access or refresh token. Returns whether a row was deleted.
    ///
    /// The durable deletion is authoritative; cache eviction is best effort.
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        let mut deleted = self.remove_access(token).await?;
        if deleted.is_none() {
            deleted = self.remove_refresh(token).await?;
        }

        if deleted.is_some() {
            info!(target: "auth.lifecycle", "Token revoked");
        }
        Ok(deleted.is_some())
    }

    /// Delete the token whose access token is `access_token`.
    pub async fn remove_access(&self, access_token: &str) -> Result<Option<Token>, AuthError> {
        let deleted = self
            .durable(
                "delete_token_by_access",
                self.store.delete_token_by_access(access_token),
            )
            .await?;

        self.cache.evict(&keys::access_token(access_token)).await;
        if let Some(token) = &deleted {
            self.evict_token(token).await;
        }
        Ok(deleted)
    }

    /// Delete the token whose refresh token is `refresh_token`.
    pub async fn remove_refresh(&self, refresh_token: &str) -> Result<Option<Token>, AuthError> {
        let deleted = self
            .durable(
                "delete_token_by_refresh",
                self.store.delete_token_by_refresh(refresh_token),
            )
            .await?;

        self.cache.evict(&keys::refresh_token(refresh_token)).await;
        if let Some(token) = &deleted {
            self.evict_token(token).await;
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // OAuth2 clients
    // ------------------------------------------------------------------

    /// Look up a client, cache-aside with the client cache TTL.
    pub async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>, AuthError> {
        let key = keys::client(client_id);

        if let Some(cached) = self.cache.read::<OAuthClient>(&key).await {
            if cached.client_id == client_id {
                return Ok(Some(cached));
            }
        }

        let client = self
            .durable("find_client", self.store.find_client(client_id))
            .await?;

        if let Some(client) = &client {
            self.cache
                .write_for(&key, client, Some(self.settings.client_cache_ttl))
                .await;
        }
        Ok(client)
    }

    /// Create or replace a client. The secret is stored as a bcrypt hash.
    #[instrument(skip_all, fields(client = %hash_for_correlation(client_id)))]
    pub async fn register_client(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<OAuthClient, AuthError> {
        let secret = client_secret.to_string();
        let cost = self.bcrypt_cost;
        let client_secret_hash =
            tokio::task::spawn_blocking(move || crypto::hash_password(&secret, cost))
                .await
                .map_err(|e| AuthError::Internal(format!("Hashing task failed: {}", e)))??;

        let client = OAuthClient {
            client_id: client_id.to_string(),
            client_secret_hash,
            redirect_uri: redirect_uri.to_string(),
            is_active: true,
        };

        self.durable("upsert_client", self.store.upsert_client(&client))
            .await?;
        self.cache.evict(&keys::client(client_id)).await;

        info!(target: "auth.lifecycle", "OAuth2 client registered");
        Ok(client)
    }

    /// Verify client credentials.
    ///
    /// Unknown clients are checked against a dummy hash so timing does not
    /// reveal which client ids exist.
    #[instrument(skip_all, fields(client = %hash_for_correlation(client_id)))]
    pub async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuthClient, AuthError> {
        let client = self.get_client(client_id).await?;

        let hash = client
            .as_ref()
            .map_or_else(|| DUMMY_PASSWORD_HASH.to_string(), |c| c.client_secret_hash.clone());
        let secret = client_secret.to_string();
        let matches = tokio::task::spawn_blocking(move || crypto::verify_password(&secret, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {}", e)))??;

        match client {
            Some(client) if matches && client.is_active => Ok(client),
            _ => {
                debug!(target: "auth.lifecycle", "Client authentication failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Delete used and expired rows from the durable store and clear
    /// expired user sessions.
    pub async fn purge_expired(&self) -> Result<SweepCounts, AuthError> {
        let now = self.clock.now();
        let counts = self
            .durable("purge_expired", self.store.purge_expired(now))
            .await?;
        metrics::record_sweep(counts.authorization_codes, counts.tokens, counts.sessions);
        Ok(counts)
    }
}
