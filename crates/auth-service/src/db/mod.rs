//! Ownership of the live durable-store connection.
//!
//! [`ConnectionManager`] is the only place a store handle comes from. It is
//! generic over a [`StoreConnector`] so the swap protocol can be exercised
//! without a database.

mod connection;
mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use connection::{ConnectionManager, PingPolicy};
pub use postgres::PgConnector;

use crate::errors::AuthError;
use crate::models::CredentialPair;
use async_trait::async_trait;

/// Builds and verifies store handles for a credential pair.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    /// Cheap to clone; clones share the underlying pool.
    type Handle: Clone + Send + Sync + 'static;

    /// Build a handle. Need not touch the network.
    async fn connect(&self, credentials: &CredentialPair) -> Result<Self::Handle, AuthError>;

    /// Round-trip check that the handle can actually reach the store.
    async fn ping(&self, handle: &Self::Handle) -> Result<(), AuthError>;
}
