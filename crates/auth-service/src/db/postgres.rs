use super::StoreConnector;
use crate::config::DatabaseConfig;
use crate::errors::AuthError;
use crate::models::CredentialPair;
use async_trait::async_trait;
use common::secret::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::debug;

/// Builds PostgreSQL pools from the static connection settings plus the
/// current credential pair.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn pool_options(&self) -> PgPoolOptions {
        let max = self.config.max_open_conns.max(1);
        PgPoolOptions::new()
            .max_connections(max)
            .min_connections(self.config.max_idle_conns.min(max))
            .acquire_timeout(self.config.connect_timeout)
            .max_lifetime(self.config.max_lifetime)
            .idle_timeout(self.config.max_idle_time)
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self, credentials: &CredentialPair) -> Result<PgPool, AuthError> {
        let options = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .database(&self.config.name)
            .username(&credentials.username)
            .password(credentials.password.expose_secret());

        debug!(
            target: "auth.db.connection",
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.name,
            username = %credentials.username,
            "Building connection pool"
        );

        Ok(self.pool_options().connect_lazy_with(options))
    }

    async fn ping(&self, pool: &PgPool) -> Result<(), AuthError> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(|e| AuthError::DurableStoreUnavailable(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}
