//! In-process cache with an outage switch.

use super::CacheStore;
use async_trait::async_trait;
use common::error::DependencyError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    available: AtomicBool,
    gets: AtomicUsize,
    pings: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            gets: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// When false every operation fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|(_, expires)| Instant::now() < *expires)
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.lock()
            .get(key)
            .and_then(|(_, expires)| expires.checked_duration_since(Instant::now()))
    }

    /// Overwrite an entry's bytes without touching its expiry.
    pub fn corrupt(&self, key: &str, value: &[u8]) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.0 = value.to_vec();
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), DependencyError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DependencyError::Unavailable("cache offline".to_string()))
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DependencyError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires)) if Instant::now() < *expires => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), DependencyError> {
        self.check()?;
        if ttl.is_zero() {
            return Err(DependencyError::InvalidResponse(
                "refusing to cache with zero TTL".to_string(),
            ));
        }
        self.lock()
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), DependencyError> {
        self.check()?;
        self.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DependencyError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_outage_switch() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", Duration::from_secs(5)).await.unwrap();

        cache.set_available(false);
        assert!(cache.get("k").await.is_err());
        assert!(cache.ping().await.is_err());

        cache.set_available(true);
        assert!(cache.get("k").await.unwrap().is_some());
    }
}
