//! Database credential lifecycle.

mod rotator;

pub use rotator::{CredentialRotator, DEFAULT_FETCH_TIMEOUT, MIN_ROTATION_INTERVAL};

use crate::errors::AuthError;
use crate::models::CredentialPair;
use async_trait::async_trait;

/// Receives each freshly fetched pair before it becomes current.
///
/// Returning an error vetoes the rotation: the rotator keeps serving the
/// previous pair until the next cycle.
#[async_trait]
pub trait CredentialListener: Send + Sync {
    async fn credentials_rotated(&self, pair: &CredentialPair) -> Result<(), AuthError>;
}
