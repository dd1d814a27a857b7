//! Fixed identifiers so test output is reproducible.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TEST_USERNAME: &str = "alice";
pub const TEST_PASSWORD: &str = "correct-horse-battery-staple";

pub const TEST_CLIENT_ID: &str = "test-client";
pub const TEST_CLIENT_SECRET: &str = "test-secret-12345";
pub const TEST_REDIRECT_URI: &str = "https://app.example.com/callback";
pub const TEST_SCOPE: &str = "profile.read";

/// Fixed user for OAuth2 grants that do not go through login.
pub const TEST_GRANT_USER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001);

/// Start instant for the manual clock (2025-06-15T15:06:40Z).
pub const TEST_EPOCH_SECS: i64 = 1_750_000_000;

pub fn test_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default()
}
