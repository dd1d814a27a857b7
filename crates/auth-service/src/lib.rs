//! Auth Service Library
//!
//! Issues, stores and rotates trust material for the API: user refresh and
//! access tokens, OAuth2 authorization codes and tokens for third-party
//! clients, and the database credentials the service itself uses.
//!
//! # Modules
//!
//! - `secrets` - Dynamic secrets provider client (Vault)
//! - `credentials` - Database credential rotation with a readiness gate
//! - `db` - Connection manager owning the live durable-store handle
//! - `cache` - Fast key/value cache (Redis)
//! - `store` - Durable relational store (PostgreSQL)
//! - `lifecycle` - Token and authorization code lifecycle over cache + store
//! - `health` - Composite health signal
//! - `handlers` / `routes` / `middleware` - HTTP boundary
//! - `observability` - Metrics and log correlation helpers
//! - `tasks` - Background loops

pub mod cache;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod secrets;
pub mod store;
pub mod tasks;
