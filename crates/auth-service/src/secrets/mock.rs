//! Scripted secrets provider for tests.

use super::{LeasedCredentials, SecretsClient};
use async_trait::async_trait;
use common::error::DependencyError;
use common::secret::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Returns queued results in order. Once the queue is drained the last
/// successful pair is repeated, or `Unavailable` if there never was one.
#[derive(Debug, Default)]
pub struct ScriptedSecrets {
    script: Mutex<VecDeque<Result<LeasedCredentials, DependencyError>>>,
    last_ok: Mutex<Option<LeasedCredentials>>,
    calls: AtomicUsize,
}

impl ScriptedSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that always returns the same pair.
    pub fn always(username: &str, password: &str, lease_seconds: u64) -> Self {
        let secrets = Self::new();
        secrets.push_ok(username, password, lease_seconds);
        secrets
    }

    pub fn push_ok(&self, username: &str, password: &str, lease_seconds: u64) {
        self.push(Ok(LeasedCredentials {
            username: username.to_string(),
            password: SecretString::from(password),
            lease_seconds,
        }));
    }

    pub fn push_err(&self, err: DependencyError) {
        self.push(Err(err));
    }

    fn push(&self, result: Result<LeasedCredentials, DependencyError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretsClient for ScriptedSecrets {
    async fn fetch_credentials(&self) -> Result<LeasedCredentials, DependencyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let mut last_ok = self.last_ok.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(Ok(creds)) => {
                *last_ok = Some(creds.clone());
                Ok(creds)
            }
            Some(Err(e)) => Err(e),
            None => last_ok.clone().ok_or_else(|| {
                DependencyError::Unavailable("scripted provider has nothing queued".to_string())
            }),
        }
    }
}
