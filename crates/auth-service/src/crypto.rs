//! Random token generation and password hashing.

use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::AuthError;
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::instrument;

/// Random bytes behind every access and refresh token.
pub const TOKEN_BYTES: usize = 32;

/// Bcrypt hash verified when a username is unknown, so lookups of unknown
/// and known users take comparable time.
pub const DUMMY_PASSWORD_HASH: &str =
    "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, AuthError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| AuthError::Internal(format!("Random bytes generation failed: {}", e)))?;
    Ok(bytes)
}

/// Generate an opaque, URL-safe token from `len` random bytes.
pub fn generate_token(len: usize) -> Result<String, AuthError> {
    let bytes = generate_random_bytes(len)?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[instrument(skip_all)]
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(AuthError::Internal(format!(
            "Invalid bcrypt cost: {} (must be {}-{})",
            cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
        )));
    }

    bcrypt::hash(password, cost)
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
}

#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash)
        .map_err(|e| AuthError::Internal(format!("Password verification failed: {}", e)))
}
