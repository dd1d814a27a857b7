//! Background tasks.
//!
//! - `token_sweeper` - Deletes used and expired codes and tokens
//!
//! Credential rotation is the other long-lived loop; it lives on
//! [`CredentialRotator::start_rotation`](crate::credentials::CredentialRotator::start_rotation).

pub mod token_sweeper;

pub use token_sweeper::start_token_sweeper;
