//! Composite health signal.
//!
//! [`HealthMonitor::probe`] checks the cache and the durable store
//! independently under a bounded timeout and folds the results into a
//! tri-state [`Status`]. The cache result is remembered for a short window
//! and shared with the token lifecycle, which uses
//! [`HealthMonitor::cache_available`] to decide whether to try the cache at
//! all.

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::observability::metrics;
use crate::store::DurableStore;
use chrono::SecondsFormat;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_CACHE_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Cache and store both reachable.
    Healthy,
    /// Cache down, store up. All lifecycle traffic goes to the store.
    Degraded,
    /// Store down. Correctness cannot be guaranteed.
    Unhealthy,
}

impl Status {
    fn level(self) -> u8 {
        match self {
            Status::Healthy => 0,
            Status::Degraded => 1,
            Status::Unhealthy => 2,
        }
    }

    fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Status::Healthy),
            1 => Some(Status::Degraded),
            2 => Some(Status::Unhealthy),
            _ => None,
        }
    }

    fn compose(store_up: bool, cache_up: bool) -> Self {
        match (store_up, cache_up) {
            (false, _) => Status::Unhealthy,
            (true, false) => Status::Degraded,
            (true, true) => Status::Healthy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Connected,
    Error,
}

impl From<bool> for ComponentStatus {
    fn from(up: bool) -> Self {
        if up {
            ComponentStatus::Connected
        } else {
            ComponentStatus::Error
        }
    }
}

/// Result of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub database: ComponentStatus,
    #[serde(rename = "redis")]
    pub cache: ComponentStatus,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

const UNKNOWN_LEVEL: u8 = u8::MAX;

pub struct HealthMonitor {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    probe_timeout: Duration,
    window: Duration,
    cache_observation: RwLock<Option<(bool, Instant)>>,
    last_status: AtomicU8,
}

impl HealthMonitor {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            window: DEFAULT_CACHE_WINDOW,
            cache_observation: RwLock::new(None),
            last_status: AtomicU8::new(UNKNOWN_LEVEL),
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// How long a cache liveness result is reused.
    #[must_use]
    pub fn with_cache_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Liveness of the cache, probing only when the last observation is
    /// older than the window.
    pub async fn cache_available(&self) -> bool {
        if let Some(up) = self.fresh_observation() {
            return up;
        }

        let up = matches!(
            tokio::time::timeout(self.probe_timeout, self.cache.ping()).await,
            Ok(Ok(()))
        );
        self.observe_cache(up);
        up
    }

    /// Mark the cache down for the rest of the window after a failed
    /// operation, so callers stop paying for timeouts.
    pub fn record_cache_failure(&self) {
        self.observe_cache(false);
    }

    /// Probe both dependencies.
    pub async fn probe(&self) -> HealthReport {
        let store_check = async {
            matches!(
                tokio::time::timeout(self.probe_timeout, self.store.ping()).await,
                Ok(Ok(()))
            )
        };
        let (cache_up, store_up) = tokio::join!(self.cache_available(), store_check);

        let status = Status::compose(store_up, cache_up);
        self.note_transition(status);

        HealthReport {
            status,
            database: store_up.into(),
            cache: cache_up.into(),
            timestamp: self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn fresh_observation(&self) -> Option<bool> {
        let observation = *self
            .cache_observation
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        observation
            .filter(|(_, at)| at.elapsed() < self.window)
            .map(|(up, _)| up)
    }

    fn observe_cache(&self, up: bool) {
        *self
            .cache_observation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some((up, Instant::now()));
    }

    fn note_transition(&self, status: Status) {
        metrics::set_health_status(status.level());

        let previous = self.last_status.swap(status.level(), Ordering::SeqCst);
        if previous == status.level() {
            return;
        }

        match (Status::from_level(previous), status) {
            (_, Status::Healthy) => {
                info!(target: "auth.health", status = ?status, "Dependencies healthy");
            }
            (_, Status::Degraded) => {
                warn!(
                    target: "auth.health",
                    status = ?status,
                    "Cache unreachable, serving from durable store"
                );
            }
            (previous, Status::Unhealthy) => {
                warn!(
                    target: "auth.health",
                    status = ?status,
                    previous = ?previous,
                    "Durable store unreachable"
                );
            }
        }
    }
}
