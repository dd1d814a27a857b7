use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bcrypt cost for user password hashes.
pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Client records change rarely; cache them for a day.
pub const DEFAULT_CLIENT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database: DatabaseConfig,
    /// `None` when the service runs on static credentials.
    pub vault: Option<VaultConfig>,
    /// May embed a password, so it is kept out of logs.
    pub redis_url: SecretString,
    pub tokens: TokenSettings,
    /// How long a cache liveness observation is trusted.
    pub health_cache_window: Duration,
    /// Upper bound on any single cache or store call.
    pub store_timeout: Duration,
    pub sweep_interval: Duration,
    pub bcrypt_cost: u32,
    pub json_logs: bool,
}

/// Static connection parameters; credentials come from the rotator.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    /// Fallback credentials used when no secrets provider is configured.
    pub user: String,
    pub password: SecretString,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub connect_timeout: Duration,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub addr: String,
    pub token: SecretString,
    /// Path of the dynamic database role, e.g. `database/creds/auth-service`.
    pub role_path: String,
    /// Assumed lease when the provider does not report one.
    pub lease_duration: Duration,
    pub skip_verify: bool,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub code_ttl: Duration,
    /// Random bytes per authorization code, before encoding.
    pub code_length: usize,
    pub client_cache_ttl: Duration,
    /// Whether OAuth2 token issuance includes a refresh token.
    pub issue_refresh_tokens: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(24 * 60 * 60),
            code_ttl: Duration::from_secs(15 * 60),
            code_length: 16,
            client_cache_ttl: DEFAULT_CLIENT_CACHE_TTL,
            issue_refresh_tokens: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = string_or(vars, "BIND_ADDRESS", "0.0.0.0:8080");

        let database = DatabaseConfig {
            host: string_or(vars, "DB_HOST", "localhost"),
            port: parse_or(vars, "DB_PORT", 5432u16)?,
            name: string_or(vars, "DB_NAME", "auth_db"),
            user: string_or(vars, "DB_USER", "auth"),
            password: SecretString::from(string_or(vars, "DB_PASSWORD", "")),
            max_idle_conns: parse_or(vars, "DB_MAX_IDLE_CONNS", 10u32)?,
            max_open_conns: positive(vars, "DB_MAX_OPEN_CONNS", 100u32)?,
            connect_timeout: Duration::from_secs(positive(vars, "DB_CONN_TIMEOUT", 5u64)?),
            max_lifetime: minutes(vars, "DB_CONN_MAX_LIFETIME", 60)?,
            max_idle_time: minutes(vars, "DB_CONN_MAX_IDLE_TIME", 5)?,
        };

        let vault = vault_from_vars(vars)?;

        let redis_url = SecretString::from(string_or(vars, "REDIS_URL", "redis://localhost:6379"));

        let code_length: usize = positive(vars, "AUTH_CODE_LENGTH", 16usize)?;
        if code_length < 16 {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_CODE_LENGTH".to_string(),
                reason: format!("must be at least 16 bytes, got {}", code_length),
            });
        }

        let tokens = TokenSettings {
            access_ttl: Duration::from_secs(positive(vars, "ACCESS_TOKEN_TTL_SECONDS", 900u64)?),
            refresh_ttl: Duration::from_secs(positive(vars, "REFRESH_TOKEN_TTL_SECONDS", 86_400u64)?),
            code_ttl: Duration::from_secs(positive(vars, "AUTH_CODE_TTL_SECONDS", 900u64)?),
            code_length,
            client_cache_ttl: DEFAULT_CLIENT_CACHE_TTL,
            issue_refresh_tokens: parse_or(vars, "ISSUE_REFRESH_TOKENS", true)?,
        };

        let bcrypt_cost: u32 = parse_or(vars, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                name: "BCRYPT_COST".to_string(),
                reason: format!(
                    "must be between {} and {}, got {}",
                    MIN_BCRYPT_COST, MAX_BCRYPT_COST, bcrypt_cost
                ),
            });
        }

        Ok(Config {
            bind_address,
            database,
            vault,
            redis_url,
            tokens,
            health_cache_window: Duration::from_millis(parse_or(
                vars,
                "HEALTH_CACHE_WINDOW_MS",
                5000u64,
            )?),
            store_timeout: Duration::from_millis(positive(vars, "STORE_TIMEOUT_MS", 3000u64)?),
            sweep_interval: Duration::from_secs(positive(vars, "SWEEP_INTERVAL_SECONDS", 300u64)?),
            bcrypt_cost,
            json_logs: vars.get("LOG_FORMAT").is_some_and(|v| v == "json"),
        })
    }
}

/// Vault is optional, but a partial configuration is an error.
fn vault_from_vars(vars: &HashMap<String, String>) -> Result<Option<VaultConfig>, ConfigError> {
    let addr = non_empty(vars, "VAULT_ADDR");
    let token = non_empty(vars, "VAULT_TOKEN");
    let role_path = non_empty(vars, "VAULT_ROLE_PATH");

    let (addr, token, role_path) = match (addr, token, role_path) {
        (None, None, None) => return Ok(None),
        (Some(a), Some(t), Some(r)) => (a, t, r),
        (a, t, _) => {
            let missing = if a.is_none() {
                "VAULT_ADDR"
            } else if t.is_none() {
                "VAULT_TOKEN"
            } else {
                "VAULT_ROLE_PATH"
            };
            return Err(ConfigError::MissingEnvVar(missing.to_string()));
        }
    };

    Ok(Some(VaultConfig {
        addr: addr.trim_end_matches('/').to_string(),
        token: SecretString::from(token),
        role_path: role_path.trim_matches('/').to_string(),
        lease_duration: Duration::from_secs(positive(vars, "VAULT_LEASE_DURATION", 3600u64)?),
        skip_verify: parse_or(vars, "VAULT_SKIP_VERIFY", false)?,
    }))
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|v| !v.is_empty()).cloned()
}

fn string_or(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    non_empty(vars, name).unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(vars, name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parse_or(vars, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn minutes(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    positive(vars, name, default)?
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "too large".to_string(),
        })
}
