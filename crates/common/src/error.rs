//! Errors raised by the adapters that talk to external dependencies.
//!
//! Adapters (cache client, secrets provider client) return
//! [`DependencyError`] and leave it to the calling layer to decide whether
//! the failure is absorbed (cache) or fatal (credentials at startup).

use thiserror::Error;

/// Failure talking to an external dependency.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// The dependency could not be reached or refused the connection
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    /// The dependency did not answer within the deadline
    #[error("Dependency timed out: {0}")]
    Timeout(String),

    /// The dependency answered, but with a payload we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DependencyError {
    /// Whether retrying later could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}
