//! Common utilities and types shared across the auth workspace.

#![warn(clippy::pedantic)]

/// Module for errors raised by external dependencies (cache, secrets provider)
pub mod error;

/// Module for secret types that prevent accidental logging
pub mod secret;
