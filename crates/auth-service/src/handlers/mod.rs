//! HTTP request handlers.

pub mod auth_handler;
pub mod health_handler;
pub mod metrics_handler;

pub use auth_handler::{introspect, login, logout, refresh};
pub use health_handler::{health_check, readiness_check};
pub use metrics_handler::metrics_handler;
