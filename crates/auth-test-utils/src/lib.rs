//! # Auth Test Utilities
//!
//! Shared test utilities for the auth service.
//!
//! This crate provides:
//! - Fixed test identities (users, clients, epoch)
//! - `TestStack`: the lifecycle core wired to in-memory cache and store
//!   with outage switches and a manual clock
//! - `TestAuthServer`: a real axum server bound to a random port
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let stack = TestStack::new();
//!     stack.seed_user(TEST_USERNAME, TEST_PASSWORD);
//!     let server = TestAuthServer::spawn(&stack).await?;
//!
//!     stack.cache.set_available(false);
//!     // ... requests against server.url() still succeed via the store
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod test_ids;

pub use fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
