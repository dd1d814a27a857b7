//! Fast key/value cache with per-entry expiry.
//!
//! The cache holds a derived, expendable copy of durable rows. Every method
//! may fail with a [`DependencyError`]; callers treat that as a miss.

pub mod keys;
mod redis_cache;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use redis_cache::RedisCache;

use async_trait::async_trait;
use common::error::DependencyError;
use std::time::Duration;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DependencyError>;

    /// Store `value` under `key` for `ttl`. A zero TTL is rejected.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), DependencyError>;

    async fn del(&self, key: &str) -> Result<(), DependencyError>;

    async fn ping(&self) -> Result<(), DependencyError>;
}
