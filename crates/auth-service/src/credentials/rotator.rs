//! Credential rotator.
//!
//! Holds the current database credential pair behind a `tokio::sync::watch`
//! channel. The channel starts empty (`None`) and doubles as the readiness
//! gate: [`CredentialRotator::get_credentials`] parks until the first pair
//! is published, after which reads never block. The gate is never re-armed.
//!
//! Rotation runs as one background loop that sleeps for half the granted
//! lease, fetches a new pair, hands it to a [`CredentialListener`] (the
//! connection manager) for verification and only then publishes it.

use super::CredentialListener;
use crate::clock::Clock;
use crate::errors::AuthError;
use crate::models::CredentialPair;
use crate::observability::metrics;
use crate::secrets::{LeasedCredentials, SecretsClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on a single provider round-trip.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Floor for the rotation cadence so a tiny lease cannot spin the loop.
pub const MIN_ROTATION_INTERVAL: Duration = Duration::from_secs(1);

pub struct CredentialRotator {
    secrets: Arc<dyn SecretsClient>,
    /// Used when the provider grants no lease of its own.
    fallback_lease: Duration,
    fetch_timeout: Duration,
    current: watch::Sender<Option<Arc<CredentialPair>>>,
    clock: Arc<dyn Clock>,
}

impl CredentialRotator {
    pub fn new(
        secrets: Arc<dyn SecretsClient>,
        fallback_lease: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secrets,
            fallback_lease,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            current: watch::Sender::new(None),
            clock,
        }
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Blocking first fetch.
    ///
    /// Opens the readiness gate on success. Calling it again once a pair is
    /// current is a no-op.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> Result<Arc<CredentialPair>, AuthError> {
        if let Some(pair) = self.try_current() {
            return Ok(pair);
        }

        let pair = Arc::new(self.fetch().await.map_err(|e| {
            error!(
                target: "auth.credentials.rotator",
                error = %e,
                "Initial credential fetch failed"
            );
            e
        })?);

        self.current.send_replace(Some(Arc::clone(&pair)));

        info!(
            target: "auth.credentials.rotator",
            username = %pair.username,
            lease_seconds = pair.lease_seconds,
            "Initial database credentials acquired"
        );

        Ok(pair)
    }

    /// Current pair, waiting for the first successful fetch if necessary.
    pub async fn get_credentials(&self) -> Result<Arc<CredentialPair>, AuthError> {
        let mut rx = self.current.subscribe();
        let guard = rx.wait_for(Option::is_some).await.map_err(|_| {
            AuthError::CredentialsUnavailable("credential channel closed".to_string())
        })?;
        let pair = Option::clone(&guard);
        drop(guard);

        pair.ok_or_else(|| AuthError::CredentialsUnavailable("no credentials".to_string()))
    }

    /// Current pair without waiting.
    pub fn try_current(&self) -> Option<Arc<CredentialPair>> {
        self.current.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// One rotation cycle.
    ///
    /// The new pair is published only after `listener` accepts it. On any
    /// failure the previous pair stays current.
    #[instrument(skip_all)]
    pub async fn rotate_once(
        &self,
        listener: &dyn CredentialListener,
    ) -> Result<Arc<CredentialPair>, AuthError> {
        let pair = match self.fetch().await {
            Ok(pair) => pair,
            Err(e) => {
                metrics::record_credential_rotation("fetch_failed");
                return Err(e);
            }
        };

        if let Err(e) = listener.credentials_rotated(&pair).await {
            metrics::record_credential_rotation("swap_failed");
            let reason = match e {
                AuthError::ConnectionSwapFailed(reason) => reason,
                other => other.to_string(),
            };
            return Err(AuthError::ConnectionSwapFailed(reason));
        }

        let pair = Arc::new(pair);
        self.current.send_replace(Some(Arc::clone(&pair)));
        metrics::record_credential_rotation("success");

        info!(
            target: "auth.credentials.rotator",
            username = %pair.username,
            lease_seconds = pair.lease_seconds,
            "Database credentials rotated"
        );

        Ok(pair)
    }

    /// Delay until the next rotation: half the lease of the current pair.
    pub fn rotation_interval(&self) -> Duration {
        let lease = self
            .try_current()
            .map(|pair| pair.lease_seconds)
            .filter(|secs| *secs > 0)
            .map_or(self.fallback_lease, Duration::from_secs);

        (lease / 2).max(MIN_ROTATION_INTERVAL)
    }

    /// Rotate until `cancel` fires.
    ///
    /// Failures are logged and retried at the same cadence; they never end
    /// the loop.
    #[instrument(skip_all, name = "credential_rotation")]
    pub async fn start_rotation(
        self: Arc<Self>,
        listener: Arc<dyn CredentialListener>,
        cancel: CancellationToken,
    ) {
        info!(
            target: "auth.credentials.rotator",
            interval_secs = self.rotation_interval().as_secs(),
            "Starting credential rotation"
        );

        loop {
            let interval = self.rotation_interval();

            tokio::select! {
                () = cancel.cancelled() => {
                    info!(target: "auth.credentials.rotator", "Credential rotation stopping");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            match self.rotate_once(listener.as_ref()).await {
                Ok(_) => {
                    debug!(
                        target: "auth.credentials.rotator",
                        next_in_secs = self.rotation_interval().as_secs(),
                        "Rotation cycle complete"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "auth.credentials.rotator",
                        error = %e,
                        retry_in_secs = interval.as_secs(),
                        "Credential rotation failed, keeping previous credentials"
                    );
                }
            }
        }
    }

    async fn fetch(&self) -> Result<CredentialPair, AuthError> {
        let leased = tokio::time::timeout(self.fetch_timeout, self.secrets.fetch_credentials())
            .await
            .map_err(|_| {
                AuthError::CredentialsUnavailable(format!(
                    "secrets provider did not answer within {:?}",
                    self.fetch_timeout
                ))
            })?
            .map_err(|e| AuthError::CredentialsUnavailable(e.to_string()))?;

        Ok(self.to_pair(leased))
    }

    fn to_pair(&self, leased: LeasedCredentials) -> CredentialPair {
        CredentialPair {
            username: leased.username,
            password: leased.password,
            fetched_at: self.clock.now(),
            lease_seconds: leased.lease_seconds,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::secrets::mock::ScriptedSecrets;
    use async_trait::async_trait;
    use common::error::DependencyError;
    use common::secret::ExposeSecret;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        reject: AtomicBool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CredentialListener for RecordingListener {
        async fn credentials_rotated(&self, pair: &CredentialPair) -> Result<(), AuthError> {
            self.seen.lock().unwrap().push(pair.username.clone());
            if self.reject.load(Ordering::SeqCst) {
                return Err(AuthError::ConnectionSwapFailed("ping failed".to_string()));
            }
            Ok(())
        }
    }

    fn rotator_with(secrets: Arc<ScriptedSecrets>) -> Arc<CredentialRotator> {
        Arc::new(CredentialRotator::new(
            secrets,
            Duration::from_secs(3600),
            Arc::new(SystemClock),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_credentials_blocks_until_initialized() {
        let secrets = Arc::new(ScriptedSecrets::always("user-a", "pass-a", 60));
        let rotator = rotator_with(secrets);

        let reader = {
            let rotator = Arc::clone(&rotator);
            tokio::spawn(async move { rotator.get_credentials().await })
        };

        tokio::task::yield_now().await;
        assert!(!reader.is_finished());
        assert!(!rotator.is_ready());

        rotator.initialize().await.unwrap();

        let pair = reader.await.unwrap().unwrap();
        assert_eq!(pair.username, "user-a");
        assert_eq!(pair.password.expose_secret(), "pass-a");
    }

    #[tokio::test]
    async fn test_initialize_fails_when_provider_unreachable() {
        let secrets = Arc::new(ScriptedSecrets::new());
        secrets.push_err(DependencyError::Unavailable("connection refused".to_string()));
        let rotator = rotator_with(secrets);

        let err = rotator.initialize().await.unwrap_err();
        assert!(matches!(err, AuthError::CredentialsUnavailable(_)));
        assert!(rotator.try_current().is_none());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let secrets = Arc::new(ScriptedSecrets::always("user-a", "pass-a", 60));
        let rotator = rotator_with(Arc::clone(&secrets));

        rotator.initialize().await.unwrap();
        rotator.initialize().await.unwrap();

        assert_eq!(secrets.calls(), 1);
    }

    #[tokio::test]
    async fn test_rotate_publishes_only_after_listener_accepts() {
        let secrets = Arc::new(ScriptedSecrets::new());
        secrets.push_ok("user-a", "pass-a", 60);
        secrets.push_ok("user-b", "pass-b", 60);
        let rotator = rotator_with(secrets);
        let listener = RecordingListener::default();

        rotator.initialize().await.unwrap();
        let rotated = rotator.rotate_once(&listener).await.unwrap();

        assert_eq!(rotated.username, "user-b");
        assert_eq!(rotator.get_credentials().await.unwrap().username, "user-b");
        assert_eq!(*listener.seen.lock().unwrap(), vec!["user-b".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_swap_keeps_previous_pair() {
        let secrets = Arc::new(ScriptedSecrets::new());
        secrets.push_ok("user-a", "pass-a", 60);
        secrets.push_ok("user-b", "wrong-password", 60);
        let rotator = rotator_with(secrets);
        let listener = RecordingListener::default();
        listener.reject.store(true, Ordering::SeqCst);

        rotator.initialize().await.unwrap();
        let err = rotator.rotate_once(&listener).await.unwrap_err();

        assert!(matches!(err, AuthError::ConnectionSwapFailed(_)));
        let current = rotator.get_credentials().await.unwrap();
        assert_eq!(current.username, "user-a");
        assert_eq!(current.password.expose_secret(), "pass-a");
    }

    #[tokio::test]
    async fn test_fetch_failure_during_rotation_keeps_previous_pair() {
        let secrets = Arc::new(ScriptedSecrets::new());
        secrets.push_ok("user-a", "pass-a", 60);
        secrets.push_err(DependencyError::Timeout("vault slow".to_string()));
        let rotator = rotator_with(secrets);
        let listener = RecordingListener::default();

        rotator.initialize().await.unwrap();
        let err = rotator.rotate_once(&listener).await.unwrap_err();

        assert!(matches!(err, AuthError::CredentialsUnavailable(_)));
        assert!(listener.seen.lock().unwrap().is_empty());
        assert_eq!(rotator.try_current().unwrap().username, "user-a");
    }

    #[tokio::test]
    async fn test_snapshot_is_never_mixed() {
        let secrets = Arc::new(ScriptedSecrets::new());
        secrets.push_ok("user-a", "pass-a", 60);
        secrets.push_ok("user-b", "pass-b", 60);
        let rotator = rotator_with(secrets);

        let before = rotator.initialize().await.unwrap();
        rotator
            .rotate_once(&RecordingListener::default())
            .await
            .unwrap();
        let after = rotator.get_credentials().await.unwrap();

        assert_eq!(
            (before.username.as_str(), before.password.expose_secret()),
            ("user-a", "pass-a")
        );
        assert_eq!(
            (after.username.as_str(), after.password.expose_secret()),
            ("user-b", "pass-b")
        );
    }

    #[tokio::test]
    async fn test_rotation_interval_is_half_the_lease() {
        let secrets = Arc::new(ScriptedSecrets::always("user-a", "pass-a", 120));
        let rotator = rotator_with(secrets);

        // Before any pair the configured lease applies.
        assert_eq!(rotator.rotation_interval(), Duration::from_secs(1800));

        rotator.initialize().await.unwrap();
        assert_eq!(rotator.rotation_interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_rotation_interval_has_floor() {
        let secrets = Arc::new(ScriptedSecrets::always("user-a", "pass-a", 1));
        let rotator = rotator_with(secrets);
        rotator.initialize().await.unwrap();

        assert_eq!(rotator.rotation_interval(), MIN_ROTATION_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rotation_fires_on_schedule_and_survives_failures() {
        let secrets = Arc::new(ScriptedSecrets::new());
        secrets.push_ok("user-a", "pass-a", 20);
        secrets.push_err(DependencyError::Unavailable("down".to_string()));
        secrets.push_ok("user-c", "pass-c", 20);
        let rotator = rotator_with(Arc::clone(&secrets));
        rotator.initialize().await.unwrap();

        let listener = Arc::new(RecordingListener::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&rotator).start_rotation(
            Arc::clone(&listener) as Arc<dyn CredentialListener>,
            cancel.clone(),
        ));

        // First cycle at 10s fails, second at 20s succeeds.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(secrets.calls(), 2);
        assert_eq!(rotator.try_current().unwrap().username, "user-a");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(secrets.calls(), 3);
        assert_eq!(rotator.try_current().unwrap().username, "user-c");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rotation_stops_on_cancel() {
        let secrets = Arc::new(ScriptedSecrets::always("user-a", "pass-a", 3600));
        let rotator = rotator_with(Arc::clone(&secrets));
        rotator.initialize().await.unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&rotator).start_rotation(
            Arc::new(RecordingListener::default()),
            cancel.clone(),
        ));

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(secrets.calls(), 1);
    }
}
