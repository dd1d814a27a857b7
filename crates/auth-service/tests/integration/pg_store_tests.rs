//! PostgreSQL store against a real database.
//!
//! Ignored by default. Run with `DATABASE_URL` set:
//! `cargo test -p auth-service --test integration_tests -- --ignored`

use auth_service::config::Config;
use auth_service::db::{ConnectionManager, PgConnector, PingPolicy};
use auth_service::models::{AuthorizationCode, OAuthClient, SessionGrant, Token};
use auth_service::store::{DurableStore, PgStore};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn store_over(pool: PgPool) -> Result<PgStore, anyhow::Error> {
    let config = Config::from_vars(&HashMap::new())?;
    let connections = ConnectionManager::adopt(
        PgConnector::new(config.database),
        pool,
        PingPolicy::default(),
    );
    Ok(PgStore::new(Arc::new(connections)))
}

async fn seed_client(store: &PgStore, client_id: &str) -> Result<(), anyhow::Error> {
    store
        .upsert_client(&OAuthClient {
            client_id: client_id.to_string(),
            client_secret_hash: "$2b$04$placeholderplaceholderplacehol".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            is_active: true,
        })
        .await?;
    Ok(())
}

fn token(client_id: &str, access: &str, refresh: &str) -> Token {
    let now = Utc::now();
    Token {
        access_token: access.to_string(),
        refresh_token: Some(refresh.to_string()),
        client_id: client_id.to_string(),
        user_id: Uuid::new_v4(),
        scope: "read".to_string(),
        access_expires_at: now + Duration::minutes(15),
        refresh_expires_at: Some(now + Duration::days(1)),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_code_consume_is_single_use(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = store_over(pool)?;
    seed_client(&store, "client-a").await?;
    let now = Utc::now();
    store
        .insert_authorization_code(&AuthorizationCode {
            code: "c1".to_string(),
            client_id: "client-a".to_string(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            scope: "read".to_string(),
            expires_at: now + Duration::minutes(5),
            used: false,
        })
        .await?;

    let (a, b) = tokio::join!(
        store.consume_authorization_code("c1", now),
        store.consume_authorization_code("c1", now)
    );
    let winners = [a?, b?].iter().filter(|r| r.is_some()).count();
    assert_eq!(winners, 1);

    assert!(store.find_authorization_code("c1", now).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_find_client_skips_inactive(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = store_over(pool)?;
    seed_client(&store, "client-a").await?;
    assert!(store.find_client("client-a").await?.is_some());

    store
        .upsert_client(&OAuthClient {
            client_id: "client-a".to_string(),
            client_secret_hash: "$2b$04$placeholderplaceholderplacehol".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            is_active: false,
        })
        .await?;
    assert!(store.find_client("client-a").await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_code_expiry_is_exclusive(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = store_over(pool)?;
    seed_client(&store, "client-a").await?;
    let expires_at = Utc::now() + Duration::minutes(5);
    store
        .insert_authorization_code(&AuthorizationCode {
            code: "c2".to_string(),
            client_id: "client-a".to_string(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            scope: String::new(),
            expires_at,
            used: false,
        })
        .await?;

    assert!(store.consume_authorization_code("c2", expires_at).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_replace_token_retires_old_refresh(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = store_over(pool)?;
    seed_client(&store, "client-a").await?;
    store.insert_token(&token("client-a", "a1", "r1")).await?;

    let replaced = store
        .replace_token("r1", &token("client-a", "a2", "r2"), Utc::now())
        .await?;
    assert_eq!(replaced.map(|t| t.access_token), Some("a1".to_string()));

    assert!(store.find_token_by_refresh("r1").await?.is_none());
    assert!(store.find_token_by_access("a1").await?.is_none());
    assert!(store.find_token_by_refresh("r2").await?.is_some());

    let again = store
        .replace_token("r1", &token("client-a", "a3", "r3"), Utc::now())
        .await?;
    assert!(again.is_none());
    assert!(store.find_token_by_access("a3").await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_user_session_rotation(pool: PgPool) -> Result<(), anyhow::Error> {
    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING user_id",
    )
    .bind("alice")
    .bind("alice@example.com")
    .bind("$2b$04$placeholderplaceholderplacehol")
    .fetch_one(&pool)
    .await?;
    let store = store_over(pool)?;

    let user = store.find_user_by_username("alice").await?;
    assert_eq!(user.map(|u| u.user_id), Some(user_id));

    let now = Utc::now();
    let grant = |access: &str, refresh: &str| SessionGrant {
        user_id,
        access_token: access.to_string(),
        access_expires_at: now + Duration::minutes(15),
        refresh_token: refresh.to_string(),
        refresh_expires_at: now + Duration::days(1),
    };

    store.record_login(&grant("a1", "r1")).await?;
    let previous = store.rotate_user_session("r1", &grant("a2", "r2"), now).await?;
    assert_eq!(previous.and_then(|p| p.refresh_token), Some("r1".to_string()));

    assert!(store.find_session_by_refresh("r1").await?.is_none());
    assert!(store.find_session_by_access("a1").await?.is_none());
    assert!(store
        .rotate_user_session("r1", &grant("a3", "r3"), now)
        .await?
        .is_none());

    store.clear_user_session("r2").await?;
    assert!(store.find_session_by_access("a2").await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_purge_expired(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = store_over(pool)?;
    seed_client(&store, "client-a").await?;
    let mut expired = token("client-a", "a-old", "r-old");
    expired.access_expires_at = Utc::now() - Duration::hours(2);
    expired.refresh_expires_at = Some(Utc::now() - Duration::hours(1));
    store.insert_token(&expired).await?;
    store.insert_token(&token("client-a", "a-live", "r-live")).await?;

    let counts = store.purge_expired(Utc::now()).await?;

    assert_eq!(counts.tokens, 1);
    assert!(store.find_token_by_access("a-live").await?.is_some());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_default_roles_seeded_and_enforced(pool: PgPool) -> Result<(), anyhow::Error> {
    let roles: Vec<String> = sqlx::query_scalar("SELECT name FROM roles ORDER BY role_id")
        .fetch_all(&pool)
        .await?;
    assert_eq!(roles, vec!["admin", "user", "moderator"]);

    let role_id: Option<i32> = sqlx::query_scalar(
        "INSERT INTO users (username, email, password_hash, role_id) \
         VALUES ('bob', 'bob@example.com', 'x', 2) RETURNING role_id",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(role_id, Some(2));

    let unknown_role = sqlx::query(
        "INSERT INTO users (username, email, password_hash, role_id) \
         VALUES ('carol', 'carol@example.com', 'x', 99)",
    )
    .execute(&pool)
    .await;
    assert!(unknown_role.is_err());
    Ok(())
}
