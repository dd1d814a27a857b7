use super::StoreConnector;
use crate::credentials::CredentialListener;
use crate::errors::AuthError;
use crate::models::CredentialPair;
use crate::observability::metrics;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Bounded retry used to verify a freshly built handle.
#[derive(Debug, Clone, Copy)]
pub struct PingPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for PingPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the single live store handle.
///
/// Swaps are copy-then-publish: a new handle is built and verified off to
/// the side and replaces the old one under a short write lock. Callers that
/// already cloned the old handle keep using it until they drop it.
pub struct ConnectionManager<C: StoreConnector> {
    connector: C,
    current: RwLock<C::Handle>,
    swap_lock: Mutex<()>,
    policy: PingPolicy,
}

impl<C: StoreConnector> ConnectionManager<C> {
    /// Build and verify the first handle. Failure here is fatal at startup.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn connect(
        connector: C,
        credentials: &CredentialPair,
        policy: PingPolicy,
    ) -> Result<Self, AuthError> {
        let handle = connector.connect(credentials).await?;
        verify(&connector, &handle, policy).await.map_err(|e| {
            error!(
                target: "auth.db.connection",
                error = %e,
                "Initial durable store connection could not be verified"
            );
            AuthError::DurableStoreUnavailable(e.to_string())
        })?;

        info!(
            target: "auth.db.connection",
            username = %credentials.username,
            "Durable store connection established"
        );

        Ok(Self {
            connector,
            current: RwLock::new(handle),
            swap_lock: Mutex::new(()),
            policy,
        })
    }

    /// Wrap a handle that was verified elsewhere.
    pub fn adopt(connector: C, handle: C::Handle, policy: PingPolicy) -> Self {
        Self {
            connector,
            current: RwLock::new(handle),
            swap_lock: Mutex::new(()),
            policy,
        }
    }

    /// Latest verified handle.
    pub async fn connection(&self) -> C::Handle {
        self.current.read().await.clone()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Replace the live handle with one built from `credentials`.
    ///
    /// On verification failure the previous handle stays live and
    /// [`AuthError::ConnectionSwapFailed`] is returned.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn swap(&self, credentials: &CredentialPair) -> Result<(), AuthError> {
        let _serialized = self.swap_lock.lock().await;
        let started = Instant::now();

        let candidate = match self.connector.connect(credentials).await {
            Ok(handle) => handle,
            Err(e) => {
                metrics::record_connection_swap("failure", started.elapsed());
                return Err(AuthError::ConnectionSwapFailed(e.to_string()));
            }
        };

        if let Err(e) = verify(&self.connector, &candidate, self.policy).await {
            metrics::record_connection_swap("failure", started.elapsed());
            error!(
                target: "auth.db.connection",
                username = %credentials.username,
                error = %e,
                "New connection failed verification, keeping current connection"
            );
            return Err(AuthError::ConnectionSwapFailed(e.to_string()));
        }

        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, candidate)
        };
        // In-flight users hold their own clones; this only drops ours.
        drop(previous);

        metrics::record_connection_swap("success", started.elapsed());
        info!(
            target: "auth.db.connection",
            username = %credentials.username,
            elapsed_ms = started.elapsed().as_millis(),
            "Durable store connection swapped"
        );

        Ok(())
    }

    /// Single bounded ping of the live handle.
    pub async fn ping_current(&self) -> Result<(), AuthError> {
        let handle = self.connection().await;
        ping_with_timeout(&self.connector, &handle, self.policy.timeout).await
    }
}

#[async_trait]
impl<C: StoreConnector> CredentialListener for ConnectionManager<C> {
    async fn credentials_rotated(&self, pair: &CredentialPair) -> Result<(), AuthError> {
        self.swap(pair).await
    }
}

async fn verify<C: StoreConnector>(
    connector: &C,
    handle: &C::Handle,
    policy: PingPolicy,
) -> Result<(), AuthError> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match ping_with_timeout(connector, handle, policy.timeout).await {
            Ok(()) => {
                debug!(target: "auth.db.connection", attempt, "Ping succeeded");
                return Ok(());
            }
            Err(e) => {
                warn!(
                    target: "auth.db.connection",
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Ping failed"
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| AuthError::DurableStoreUnavailable("ping not attempted".to_string())))
}

async fn ping_with_timeout<C: StoreConnector>(
    connector: &C,
    handle: &C::Handle,
    timeout: Duration,
) -> Result<(), AuthError> {
    tokio::time::timeout(timeout, connector.ping(handle))
        .await
        .map_err(|_| AuthError::Timeout(format!("store ping exceeded {:?}", timeout)))?
}
