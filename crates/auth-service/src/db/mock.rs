//! In-process connector for exercising the swap protocol.

use super::StoreConnector;
use crate::errors::AuthError;
use crate::models::CredentialPair;
use async_trait::async_trait;
use common::secret::ExposeSecret;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
pub struct MockHandle {
    pub username: String,
    password: String,
    closed: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Accepts any pair at connect time; pings fail for rejected passwords,
/// like a lazily connecting pool.
#[derive(Debug, Default)]
pub struct MockConnector {
    rejected: Mutex<HashSet<String>>,
    hang: AtomicBool,
    connects: AtomicUsize,
    pings: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_password(&self, password: &str) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(password.to_string());
    }

    /// Make pings never complete.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    type Handle = MockHandle;

    async fn connect(&self, credentials: &CredentialPair) -> Result<MockHandle, AuthError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockHandle {
            username: credentials.username.clone(),
            password: credentials.password.expose_secret().to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn ping(&self, handle: &MockHandle) -> Result<(), AuthError> {
        self.pings.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let rejected = self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&handle.password);
        if rejected || handle.is_closed() {
            return Err(AuthError::DurableStoreUnavailable(format!(
                "password authentication failed for user \"{}\"",
                handle.username
            )));
        }
        Ok(())
    }
}
