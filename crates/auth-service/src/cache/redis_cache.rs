use super::CacheStore;
use async_trait::async_trait;
use common::error::DependencyError;
use common::secret::{ExposeSecret, SecretString};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed cache.
///
/// The connection is established on first use, so the service can start
/// while Redis is down and run in degraded mode. Once established,
/// `ConnectionManager` reconnects on its own.
pub struct RedisCache {
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(url: &SecretString) -> Result<Self, DependencyError> {
        let client = redis::Client::open(url.expose_secret())
            .map_err(|e| DependencyError::Unavailable(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connection(&self) -> Result<ConnectionManager, DependencyError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(self.timeout, self.client.get_connection_manager())
            .await
            .map_err(|_| DependencyError::Timeout("Redis connect timed out".to_string()))?
            .map_err(|e| {
                warn!(target: "auth.cache.redis", error = %e, "Redis connection failed");
                DependencyError::Unavailable(format!("Redis connection failed: {}", e))
            })?;

        info!(target: "auth.cache.redis", "Redis connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, DependencyError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| DependencyError::Timeout(format!("Redis {} timed out", op)))?
            .map_err(|e| DependencyError::Unavailable(format!("Redis {} failed: {}", op, e)))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DependencyError> {
        let mut conn = self.connection().await?;
        self.bounded("GET", conn.get::<_, Option<Vec<u8>>>(key))
            .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), DependencyError> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(DependencyError::InvalidResponse(
                "refusing to cache with zero TTL".to_string(),
            ));
        }

        let mut conn = self.connection().await?;
        self.bounded("SET", conn.pset_ex::<_, _, ()>(key, value, millis))
            .await
    }

    async fn del(&self, key: &str) -> Result<(), DependencyError> {
        let mut conn = self.connection().await?;
        self.bounded("DEL", conn.del::<_, ()>(key)).await
    }

    async fn ping(&self) -> Result<(), DependencyError> {
        let mut conn = self.connection().await?;
        let pong: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(DependencyError::InvalidResponse(format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }
}
