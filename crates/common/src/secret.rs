//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. Every credential that crosses this
//! workspace (database passwords leased from the secrets provider, the
//! provider's own access token, user passwords on the login path) is held as
//! a [`SecretString`], so deriving `Debug` on a struct that contains one is
//! always safe.
//!
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct DatabaseLogin {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let login = DatabaseLogin {
//!     username: "v-auth-7f3a".to_string(),
//!     password: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{login:?}").contains("s3cr3t"));
//! assert_eq!(login.password.expose_secret(), "s3cr3t");
//! ```
//!
//! # Serde
//!
//! With the `serde` feature enabled, secrets can be deserialized directly
//! from provider responses:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct LeaseData {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let json = r#"{"username": "v-auth-7f3a", "password": "s3cr3t"}"#;
//! let data: LeaseData = serde_json::from_str(json).unwrap();
//! assert!(!format!("{data:?}").contains("s3cr3t"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("db-password-123");
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("db-password-123"));
    }

    #[test]
    fn test_clone_preserves_value() {
        let secret = SecretString::from("lease-pw");
        let copy = secret.clone();
        assert_eq!(copy.expose_secret(), "lease-pw");
    }

    #[test]
    fn test_deserialize_from_provider_payload() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            password: SecretString,
        }

        let payload: Payload = serde_json::from_str(r#"{"password":"abc"}"#).unwrap();
        assert_eq!(payload.password.expose_secret(), "abc");
    }
}
