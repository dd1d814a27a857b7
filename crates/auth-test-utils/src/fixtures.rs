//! In-memory wiring of the lifecycle core.

use crate::test_ids::{test_epoch, TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_REDIRECT_URI};
use auth_service::cache::memory::MemoryCache;
use auth_service::clock::ManualClock;
use auth_service::config::{TokenSettings, MIN_BCRYPT_COST};
use auth_service::crypto;
use auth_service::health::HealthMonitor;
use auth_service::lifecycle::TokenLifecycleManager;
use auth_service::models::UserCredentials;
use auth_service::store::memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Everything a test needs to drive the service without external
/// dependencies.
///
/// The cache liveness window is zero, so toggling
/// `cache.set_available(false)` takes effect on the next call.
pub struct TestStack {
    pub cache: Arc<MemoryCache>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub health: Arc<HealthMonitor>,
    pub lifecycle: Arc<TokenLifecycleManager>,
}

impl TestStack {
    pub fn new() -> Self {
        Self::with_settings(TokenSettings::default())
    }

    pub fn with_settings(settings: TokenSettings) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(test_epoch()));
        let health = Arc::new(
            HealthMonitor::new(cache.clone(), store.clone(), clock.clone())
                .with_cache_window(Duration::ZERO)
                .with_probe_timeout(Duration::from_millis(500)),
        );
        let lifecycle = Arc::new(
            TokenLifecycleManager::new(
                cache.clone(),
                store.clone(),
                health.clone(),
                settings,
                clock.clone(),
            )
            .with_store_timeout(Duration::from_secs(2))
            .with_bcrypt_cost(MIN_BCRYPT_COST),
        );

        Self {
            cache,
            store,
            clock,
            health,
            lifecycle,
        }
    }

    /// Add an active user with a bcrypt hash of `password`.
    pub fn seed_user(&self, username: &str, password: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        let password_hash = crypto::hash_password(password, MIN_BCRYPT_COST)
            .expect("hashing at minimum cost should succeed");
        self.store.add_user(UserCredentials {
            user_id,
            username: username.to_string(),
            password_hash,
            is_active: true,
        });
        user_id
    }

    /// Register the fixed test client.
    pub async fn seed_client(&self) {
        self.lifecycle
            .register_client(TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_REDIRECT_URI)
            .await
            .expect("registering the test client should succeed");
    }

    /// Move the manual clock forward.
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).expect("test durations fit in chrono");
        self.clock.advance(by);
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}
