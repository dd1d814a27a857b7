//! First-party login sessions.
//!
//! Each user holds at most one session: a refresh token plus the access
//! token minted with it, stored on the user row. Login overwrites whatever
//! was there; refresh replaces it only if the presented refresh token is
//! still the live one.

use super::TokenLifecycleManager;
use crate::cache::keys;
use crate::crypto::{self, DUMMY_PASSWORD_HASH, TOKEN_BYTES};
use crate::errors::AuthError;
use crate::models::{SessionAccess, SessionGrant, SessionRecord, SessionRefresh};
use crate::observability::{hash_for_correlation, metrics};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SESSION: &str = "session";

impl TokenLifecycleManager {
    /// Password login.
    ///
    /// Unknown user, wrong password and inactive account all yield
    /// [`AuthError::InvalidCredentials`] after a bcrypt verification of
    /// comparable cost.
    #[instrument(skip_all)]
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionGrant, AuthError> {
        let user = self
            .durable("find_user_by_username", self.store.find_user_by_username(username))
            .await?;

        let hash = user
            .as_ref()
            .map_or_else(|| DUMMY_PASSWORD_HASH.to_string(), |u| u.password_hash.clone());
        let candidate = password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || crypto::verify_password(&candidate, &hash))
                .await
                .map_err(|e| AuthError::Internal(format!("Verification task failed: {}", e)))??;

        let user = match user {
            Some(user) if matches && user.is_active => user,
            _ => {
                metrics::record_token_issuance(SESSION, "invalid");
                debug!(target: "auth.lifecycle", "Login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let now = self.clock.now();
        let grant = self.mint_session(user.user_id, now)?;
        let previous = match self
            .durable("record_login", self.store.record_login(&grant))
            .await
        {
            Ok(Some(previous)) => previous,
            Ok(None) => {
                // Row vanished between lookup and update.
                metrics::record_token_issuance(SESSION, "invalid");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                metrics::record_token_issuance(SESSION, "failure");
                return Err(e);
            }
        };

        self.evict_session(&previous).await;
        self.mirror_session(&grant, now).await;
        metrics::record_token_issuance(SESSION, "success");
        info!(
            target: "auth.lifecycle",
            user = %hash_for_correlation(&user.user_id.to_string()),
            "User logged in"
        );

        Ok(grant)
    }

    /// Trade a live refresh token for a fresh session.
    ///
    /// The old refresh token stops matching in the same durable update that
    /// installs the new one.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionGrant, AuthError> {
        let now = self.clock.now();
        let session = self.lookup_refresh(refresh_token, now).await?;
        let grant = self.mint_session(session.user_id, now)?;

        let rotated = self
            .durable(
                "rotate_user_session",
                self.store.rotate_user_session(refresh_token, &grant, now),
            )
            .await?;

        let Some(previous) = rotated else {
            self.cache.evict(&keys::session_refresh(refresh_token)).await;
            metrics::record_token_issuance(SESSION, "invalid");
            return Err(AuthError::TokenInvalidOrExpired);
        };

        self.evict_session(&previous).await;
        self.cache.evict(&keys::session_refresh(refresh_token)).await;
        self.mirror_session(&grant, now).await;
        metrics::record_token_issuance(SESSION, "success");

        Ok(grant)
    }

    /// Valid iff the user's current access token is `access_token` and
    /// `now < access_expires_at`.
    #[instrument(skip_all)]
    pub async fn validate_session_access_token(
        &self,
        access_token: &str,
    ) -> Result<SessionAccess, AuthError> {
        let now = self.clock.now();
        let key = keys::session_access(access_token);

        if let Some(cached) = self.cache.read::<SessionAccess>(&key).await {
            if cached.valid_at(now) {
                metrics::record_token_validation(SESSION, "success", "cache");
                return Ok(cached);
            }
            self.cache.evict(&key).await;
        }

        let row = self
            .durable(
                "find_session_by_access",
                self.store.find_session_by_access(access_token),
            )
            .await?;

        match row {
            Some(session) if session.valid_at(now) => {
                self.cache
                    .write(&key, &session, session.access_expires_at, now)
                    .await;
                metrics::record_token_validation(SESSION, "success", "store");
                Ok(session)
            }
            _ => {
                metrics::record_token_validation(SESSION, "invalid", "store");
                Err(AuthError::TokenInvalidOrExpired)
            }
        }
    }

    /// End the session holding `refresh_token`. Unknown tokens are ignored.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let cleared = self
            .durable(
                "clear_user_session",
                self.store.clear_user_session(refresh_token),
            )
            .await?;

        self.cache.evict(&keys::session_refresh(refresh_token)).await;
        if let Some(previous) = cleared {
            self.evict_session(&previous).await;
            info!(
                target: "auth.lifecycle",
                user = %hash_for_correlation(&previous.user_id.to_string()),
                "User logged out"
            );
        }
        Ok(())
    }

    async fn lookup_refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionRefresh, AuthError> {
        let key = keys::session_refresh(refresh_token);

        if let Some(cached) = self.cache.read::<SessionRefresh>(&key).await {
            if now < cached.refresh_expires_at {
                return Ok(cached);
            }
            self.cache.evict(&key).await;
        }

        let row = self
            .durable(
                "find_session_by_refresh",
                self.store.find_session_by_refresh(refresh_token),
            )
            .await?;

        match row {
            Some(session) if now < session.refresh_expires_at => Ok(session),
            _ => {
                metrics::record_token_validation(SESSION, "invalid", "store");
                Err(AuthError::TokenInvalidOrExpired)
            }
        }
    }

    fn mint_session(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<SessionGrant, AuthError> {
        Ok(SessionGrant {
            user_id,
            access_token: crypto::generate_token(TOKEN_BYTES)?,
            access_expires_at: self.expiry(now, self.settings.access_ttl)?,
            refresh_token: crypto::generate_token(TOKEN_BYTES)?,
            refresh_expires_at: self.expiry(now, self.settings.refresh_ttl)?,
        })
    }

    async fn mirror_session(&self, grant: &SessionGrant, now: DateTime<Utc>) {
        let access = SessionAccess {
            user_id: grant.user_id,
            access_expires_at: grant.access_expires_at,
        };
        self.cache
            .write(
                &keys::session_access(&grant.access_token),
                &access,
                grant.access_expires_at,
                now,
            )
            .await;

        let refresh = SessionRefresh {
            user_id: grant.user_id,
            refresh_expires_at: grant.refresh_expires_at,
        };
        self.cache
            .write(
                &keys::session_refresh(&grant.refresh_token),
                &refresh,
                grant.refresh_expires_at,
                now,
            )
            .await;
    }

    async fn evict_session(&self, previous: &SessionRecord) {
        if let Some(access) = &previous.access_token {
            self.cache.evict(&keys::session_access(access)).await;
        }
        if let Some(refresh) = &previous.refresh_token {
            self.cache.evict(&keys::session_refresh(refresh)).await;
        }
    }
}
