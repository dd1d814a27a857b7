//! PostgreSQL implementation of [`DurableStore`].
//!
//! Every call fetches the pool from the [`ConnectionManager`] so a rotation
//! takes effect on the next query.

use super::DurableStore;
use crate::db::{ConnectionManager, PgConnector};
use crate::errors::AuthError;
use crate::models::{
    AuthorizationCode, OAuthClient, SessionAccess, SessionGrant, SessionRecord, SessionRefresh,
    SweepCounts, Token, UserCredentials,
};
use crate::observability::hash_for_correlation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};

const TOKEN_COLUMNS: &str = "access_token, refresh_token, client_id, user_id, scope, \
                             access_expires_at, refresh_expires_at";

#[derive(Clone)]
pub struct PgStore {
    connections: Arc<ConnectionManager<PgConnector>>,
}

impl PgStore {
    pub fn new(connections: Arc<ConnectionManager<PgConnector>>) -> Self {
        Self { connections }
    }

    async fn pool(&self) -> PgPool {
        self.connections.connection().await
    }
}

fn unavailable(operation: &'static str) -> impl FnOnce(sqlx::Error) -> AuthError {
    move |e| {
        error!(target: "auth.store.pg", operation, error = %e, "Durable store operation failed");
        AuthError::DurableStoreUnavailable(format!("Failed to {}: {}", operation, e))
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn ping(&self) -> Result<(), AuthError> {
        self.connections.ping_current().await
    }

    #[instrument(skip_all, fields(client = %hash_for_correlation(&code.client_id)))]
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO oauth2_authorization_codes
                (code, client_id, user_id, redirect_uri, scope, expires_at, used)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(code.expires_at)
        .bind(code.used)
        .execute(&self.pool().await)
        .await
        .map_err(unavailable("insert authorization code"))?;

        Ok(())
    }

    async fn find_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, AuthError> {
        sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT code, client_id, user_id, redirect_uri, scope, expires_at, used
            FROM oauth2_authorization_codes
            WHERE code = $1 AND NOT used AND expires_at > $2
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find authorization code"))
    }

    #[instrument(skip_all)]
    async fn consume_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, AuthError> {
        // Single conditional UPDATE: concurrent redemptions serialize on the
        // row lock and only the first sees used = false.
        sqlx::query_as::<_, AuthorizationCode>(
            r#"
            UPDATE oauth2_authorization_codes
            SET used = TRUE
            WHERE code = $1 AND NOT used AND expires_at > $2
            RETURNING code, client_id, user_id, redirect_uri, scope, expires_at, used
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("consume authorization code"))
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM oauth2_authorization_codes WHERE code = $1")
            .bind(code)
            .execute(&self.pool().await)
            .await
            .map_err(unavailable("delete authorization code"))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(client = %hash_for_correlation(&token.client_id)))]
    async fn insert_token(&self, token: &Token) -> Result<(), AuthError> {
        insert_token_with(&self.pool().await, token).await
    }

    async fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, AuthError> {
        sqlx::query_as::<_, Token>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth2_tokens WHERE access_token = $1"
        ))
        .bind(access_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find token by access"))
    }

    async fn find_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, AuthError> {
        sqlx::query_as::<_, Token>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth2_tokens WHERE refresh_token = $1"
        ))
        .bind(refresh_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find token by refresh"))
    }

    #[instrument(skip_all, fields(client = %hash_for_correlation(&new.client_id)))]
    async fn replace_token(
        &self,
        old_refresh: &str,
        new: &Token,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, AuthError> {
        let pool = self.pool().await;
        let mut tx = pool
            .begin()
            .await
            .map_err(unavailable("begin token rotation"))?;

        let old = sqlx::query_as::<_, Token>(&format!(
            "DELETE FROM oauth2_tokens \
             WHERE refresh_token = $1 AND refresh_expires_at > $2 \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(old_refresh)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unavailable("delete rotated token"))?;

        let Some(old) = old else {
            tx.rollback()
                .await
                .map_err(unavailable("roll back token rotation"))?;
            return Ok(None);
        };

        insert_token_with(&mut *tx, new).await?;

        tx.commit()
            .await
            .map_err(unavailable("commit token rotation"))?;

        Ok(Some(old))
    }

    async fn delete_token_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<Token>, AuthError> {
        sqlx::query_as::<_, Token>(&format!(
            "DELETE FROM oauth2_tokens WHERE access_token = $1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(access_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("delete token by access"))
    }

    async fn delete_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, AuthError> {
        sqlx::query_as::<_, Token>(&format!(
            "DELETE FROM oauth2_tokens WHERE refresh_token = $1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(refresh_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("delete token by refresh"))
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, AuthError> {
        sqlx::query_as::<_, OAuthClient>(
            r#"
            SELECT client_id, client_secret_hash, redirect_uri, is_active
            FROM oauth2_clients
            WHERE client_id = $1 AND is_active
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find client"))
    }

    async fn upsert_client(&self, client: &OAuthClient) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO oauth2_clients (client_id, client_secret_hash, redirect_uri, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (client_id) DO UPDATE
            SET client_secret_hash = EXCLUDED.client_secret_hash,
                redirect_uri = EXCLUDED.redirect_uri,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.redirect_uri)
        .bind(client.is_active)
        .execute(&self.pool().await)
        .await
        .map_err(unavailable("upsert client"))?;

        Ok(())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        sqlx::query_as::<_, UserCredentials>(
            r#"
            SELECT user_id, username, password_hash, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find user by username"))
    }

    #[instrument(skip_all, fields(user = %hash_for_correlation(&grant.user_id.to_string())))]
    async fn record_login(&self, grant: &SessionGrant) -> Result<Option<SessionRecord>, AuthError> {
        sqlx::query_as::<_, SessionRecord>(
            r#"
            UPDATE users u
            SET refresh_token = $2,
                refresh_token_expiry = $3,
                access_token = $4,
                access_token_expiry = $5,
                last_login_at = NOW(),
                updated_at = NOW()
            FROM (
                SELECT user_id, refresh_token, access_token
                FROM users
                WHERE user_id = $1
                FOR UPDATE
            ) old
            WHERE u.user_id = old.user_id
            RETURNING old.user_id, old.refresh_token, old.access_token
            "#,
        )
        .bind(grant.user_id)
        .bind(&grant.refresh_token)
        .bind(grant.refresh_expires_at)
        .bind(&grant.access_token)
        .bind(grant.access_expires_at)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("record login"))
    }

    #[instrument(skip_all, fields(user = %hash_for_correlation(&grant.user_id.to_string())))]
    async fn rotate_user_session(
        &self,
        old_refresh: &str,
        grant: &SessionGrant,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AuthError> {
        // The subselect locks the row only if it still holds the old refresh
        // token, so the old token stops matching in the same statement that
        // installs the new one.
        sqlx::query_as::<_, SessionRecord>(
            r#"
            UPDATE users u
            SET refresh_token = $3,
                refresh_token_expiry = $4,
                access_token = $5,
                access_token_expiry = $6,
                updated_at = NOW()
            FROM (
                SELECT user_id, refresh_token, access_token
                FROM users
                WHERE user_id = $1
                  AND refresh_token = $2
                  AND refresh_token_expiry > $7
                  AND is_active
                FOR UPDATE
            ) old
            WHERE u.user_id = old.user_id
            RETURNING old.user_id, old.refresh_token, old.access_token
            "#,
        )
        .bind(grant.user_id)
        .bind(old_refresh)
        .bind(&grant.refresh_token)
        .bind(grant.refresh_expires_at)
        .bind(&grant.access_token)
        .bind(grant.access_expires_at)
        .bind(now)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("rotate user session"))
    }

    async fn find_session_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<SessionAccess>, AuthError> {
        sqlx::query_as::<_, SessionAccess>(
            r#"
            SELECT user_id, access_token_expiry AS access_expires_at
            FROM users
            WHERE access_token = $1 AND access_token_expiry IS NOT NULL AND is_active
            "#,
        )
        .bind(access_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find session by access"))
    }

    async fn find_session_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRefresh>, AuthError> {
        sqlx::query_as::<_, SessionRefresh>(
            r#"
            SELECT user_id, refresh_token_expiry AS refresh_expires_at
            FROM users
            WHERE refresh_token = $1 AND refresh_token_expiry IS NOT NULL AND is_active
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("find session by refresh"))
    }

    #[instrument(skip_all)]
    async fn clear_user_session(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRecord>, AuthError> {
        sqlx::query_as::<_, SessionRecord>(
            r#"
            UPDATE users u
            SET refresh_token = NULL,
                refresh_token_expiry = NULL,
                access_token = NULL,
                access_token_expiry = NULL,
                updated_at = NOW()
            FROM (
                SELECT user_id, refresh_token, access_token
                FROM users
                WHERE refresh_token = $1
                FOR UPDATE
            ) old
            WHERE u.user_id = old.user_id
            RETURNING old.user_id, old.refresh_token, old.access_token
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(unavailable("clear user session"))
    }

    #[instrument(skip_all)]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<SweepCounts, AuthError> {
        let pool = self.pool().await;

        let codes = sqlx::query(
            "DELETE FROM oauth2_authorization_codes WHERE used OR expires_at <= $1",
        )
        .bind(now)
        .execute(&pool)
        .await
        .map_err(unavailable("purge authorization codes"))?;

        let tokens = sqlx::query(
            r#"
            DELETE FROM oauth2_tokens
            WHERE access_expires_at <= $1
              AND (refresh_expires_at IS NULL OR refresh_expires_at <= $1)
            "#,
        )
        .bind(now)
        .execute(&pool)
        .await
        .map_err(unavailable("purge tokens"))?;

        // The access token never outlives its refresh token.
        let sessions = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = NULL, refresh_token_expiry = NULL,
                access_token = NULL, access_token_expiry = NULL,
                updated_at = NOW()
            WHERE refresh_token_expiry <= $1
            "#,
        )
        .bind(now)
        .execute(&pool)
        .await
        .map_err(unavailable("clear expired user sessions"))?;

        Ok(SweepCounts {
            authorization_codes: codes.rows_affected(),
            tokens: tokens.rows_affected(),
            sessions: sessions.rows_affected(),
        })
    }
}

async fn insert_token_with<'e, E>(executor: E, token: &Token) -> Result<(), AuthError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO oauth2_tokens
            (access_token, refresh_token, client_id, user_id, scope,
             access_expires_at, refresh_expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&token.access_token)
    .bind(&token.refresh_token)
    .bind(&token.client_id)
    .bind(token.user_id)
    .bind(&token.scope)
    .bind(token.access_expires_at)
    .bind(token.refresh_expires_at)
    .execute(executor)
    .await
    .map_err(unavailable("insert token"))?;

    Ok(())
}
