//! Observability for the auth service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit fields.
//! Fields fall into three groups:
//! - **SAFE**: logged as-is (operation kinds, statuses, usernames of
//!   provider-issued database roles)
//! - **HASHED**: SHA-256 prefix via [`hash_for_correlation`] (client ids,
//!   user ids, tokens when correlation is needed)
//! - **NEVER**: passwords, full tokens, authorization codes

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// One-way and truncated. Not a substitute for secret handling.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    hex::encode(result.get(..4).unwrap_or_default())
}
