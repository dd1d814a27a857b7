//! Dynamic secrets provider.
//!
//! The provider hands out a database username/password pair together with
//! the lease it was issued under. [`VaultClient`] talks to a Vault database
//! secrets engine; [`StaticSecrets`] serves a fixed pair from configuration
//! when no provider is configured.

mod vault;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use vault::VaultClient;

use async_trait::async_trait;
use common::error::DependencyError;
use common::secret::SecretString;

/// Credentials as returned by the provider.
#[derive(Debug, Clone)]
pub struct LeasedCredentials {
    pub username: String,
    pub password: SecretString,
    /// Lease in seconds, zero when the provider did not send one.
    pub lease_seconds: u64,
}

#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Fetch a fresh credential pair.
    ///
    /// Fails with [`DependencyError::Unavailable`] when the provider cannot
    /// be reached and [`DependencyError::InvalidResponse`] when the reply is
    /// missing or malformed.
    async fn fetch_credentials(&self) -> Result<LeasedCredentials, DependencyError>;
}

/// Fixed pair taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticSecrets {
    username: String,
    password: SecretString,
}

impl StaticSecrets {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

#[async_trait]
impl SecretsClient for StaticSecrets {
    async fn fetch_credentials(&self) -> Result<LeasedCredentials, DependencyError> {
        Ok(LeasedCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
            lease_seconds: 0,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    #[tokio::test]
    async fn test_static_secrets_returns_configured_pair() {
        let secrets = StaticSecrets::new("app", SecretString::from("hunter2"));
        let creds = secrets.fetch_credentials().await.unwrap();

        assert_eq!(creds.username, "app");
        assert_eq!(creds.password.expose_secret(), "hunter2");
        assert_eq!(creds.lease_seconds, 0);
    }
}
