//! Cache-aside read/write strategy.
//!
//! Reads try the cache first; writes go to the durable store first and are
//! mirrored here afterwards. Nothing in this module can fail a request:
//! every cache error becomes a miss, a warning and a fallback count.
//!
//! Evictions that fail during an outage are remembered and replayed before
//! the next cache operation once the cache answers again, so a revoked or
//! rotated entry does not come back after recovery.

use crate::cache::CacheStore;
use crate::errors::AuthError;
use crate::health::HealthMonitor;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::error::DependencyError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Past this many deferred evictions new ones are dropped and left to TTL.
const MAX_DEFERRED_EVICTIONS: usize = 10_000;

pub(crate) struct CachePath {
    cache: Arc<dyn CacheStore>,
    health: Arc<HealthMonitor>,
    deferred: Mutex<HashSet<String>>,
}

impl CachePath {
    pub(crate) fn new(cache: Arc<dyn CacheStore>, health: Arc<HealthMonitor>) -> Self {
        Self {
            cache,
            health,
            deferred: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.ready("read").await {
            return None;
        }

        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.absorb("read", e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(target: "auth.lifecycle", error = %e, "Discarding undecodable cache entry");
                self.evict(key).await;
                None
            }
        }
    }

    /// Mirror `value` until `expires_at`. Already-expired values are not
    /// written.
    pub(crate) async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.write_for(key, value, remaining(expires_at, now)).await;
    }

    pub(crate) async fn write_for<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        let Some(ttl) = ttl else {
            debug!(target: "auth.lifecycle", "Skipping cache write for expired entry");
            return;
        };

        if !self.ready("write").await {
            return;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(target: "auth.lifecycle", error = %e, "Failed to encode cache entry");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &bytes, ttl).await {
            self.absorb("write", e);
        }
    }

    /// Best-effort delete. A failed delete is deferred until the cache
    /// recovers; the entry's TTL is the final backstop.
    pub(crate) async fn evict(&self, key: &str) {
        match self.cache.del(key).await {
            Ok(()) => {
                self.deferred().remove(key);
            }
            Err(e) => {
                self.absorb("evict", e);
                self.defer(std::iter::once(key.to_string()));
            }
        }
    }

    /// Whether the cache should be used, replaying deferred evictions first.
    async fn ready(&self, operation: &'static str) -> bool {
        if !self.health.cache_available().await {
            metrics::record_cache_fallback(operation);
            return false;
        }
        self.replay_deferred().await
    }

    async fn replay_deferred(&self) -> bool {
        let keys = std::mem::take(&mut *self.deferred());
        if keys.is_empty() {
            return true;
        }

        let total = keys.len();
        let mut pending = keys.into_iter();
        while let Some(key) = pending.next() {
            if let Err(e) = self.cache.del(&key).await {
                self.absorb("evict", e);
                self.defer(std::iter::once(key).chain(pending));
                return false;
            }
        }

        info!(target: "auth.lifecycle", count = total, "Replayed deferred cache evictions");
        true
    }

    fn defer(&self, keys: impl IntoIterator<Item = String>) {
        let mut deferred = self.deferred();
        for key in keys {
            if deferred.len() >= MAX_DEFERRED_EVICTIONS {
                warn!(
                    target: "auth.lifecycle",
                    limit = MAX_DEFERRED_EVICTIONS,
                    "Deferred eviction set full, remaining entries expire by TTL"
                );
                return;
            }
            deferred.insert(key);
        }
    }

    fn deferred(&self) -> MutexGuard<'_, HashSet<String>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn absorb(&self, operation: &'static str, e: DependencyError) {
        let err = AuthError::CacheUnavailable(e.to_string());
        warn!(
            target: "auth.lifecycle",
            operation,
            error = %err,
            "Cache operation failed, durable store is authoritative"
        );
        self.health.record_cache_failure();
        metrics::record_cache_fallback(operation);
    }
}

/// Time left until `expires_at`, `None` once it has passed.
pub(crate) fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (expires_at - now)
        .to_std()
        .ok()
        .filter(|ttl| !ttl.is_zero())
}
