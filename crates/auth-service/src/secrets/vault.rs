use super::{LeasedCredentials, SecretsClient};
use crate::config::VaultConfig;
use async_trait::async_trait;
use common::error::DependencyError;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Vault logical read envelope for dynamic database credentials.
#[derive(Debug, Deserialize)]
struct VaultReadResponse {
    #[serde(default)]
    lease_duration: u64,
    data: Option<VaultCredentialData>,
}

#[derive(Debug, Deserialize)]
struct VaultCredentialData {
    username: Option<String>,
    password: Option<String>,
}

/// Client for a Vault database secrets engine role.
///
/// Issues `GET {addr}/v1/{role_path}` and expects
/// `{"lease_duration": N, "data": {"username": "...", "password": "..."}}`.
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: String,
    token: SecretString,
    role_path: String,
    http_client: reqwest::Client,
}

impl VaultClient {
    pub fn new(config: &VaultConfig) -> Result<Self, DependencyError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.skip_verify)
            .build()
            .map_err(|e| {
                DependencyError::Unavailable(format!("Failed to build Vault HTTP client: {}", e))
            })?;

        debug!(
            target: "auth.secrets.vault",
            addr = %config.addr,
            role_path = %config.role_path,
            skip_verify = config.skip_verify,
            "Vault client initialized"
        );

        Ok(Self {
            base_url: config.addr.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            role_path: config.role_path.trim_start_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl SecretsClient for VaultClient {
    #[instrument(skip_all, fields(role_path = %self.role_path))]
    async fn fetch_credentials(&self) -> Result<LeasedCredentials, DependencyError> {
        let url = format!("{}/v1/{}", self.base_url, self.role_path);

        let response = self
            .http_client
            .get(&url)
            .header("X-Vault-Token", self.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DependencyError::Timeout(format!("Vault request timed out: {}", e))
                } else {
                    DependencyError::Unavailable(format!("Vault request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DependencyError::Unavailable(format!(
                "Vault read failed with status {}",
                status
            )));
        }

        let body: VaultReadResponse = response.json().await.map_err(|e| {
            DependencyError::InvalidResponse(format!("Failed to parse Vault response: {}", e))
        })?;

        let data = body.data.ok_or_else(|| {
            DependencyError::InvalidResponse("Vault response has no data".to_string())
        })?;

        let username = data
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DependencyError::InvalidResponse("username missing".to_string()))?;
        let password = data
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| DependencyError::InvalidResponse("password missing".to_string()))?;

        debug!(
            target: "auth.secrets.vault",
            username = %username,
            lease_seconds = body.lease_duration,
            "Fetched database credentials"
        );

        Ok(LeasedCredentials {
            username,
            password: SecretString::from(password),
            lease_seconds: body.lease_duration,
        })
    }
}
