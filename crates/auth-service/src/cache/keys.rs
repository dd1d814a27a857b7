//! Cache key layout. One prefix per entity kind.

pub const AUTH_CODE_PREFIX: &str = "oauth2:authcode:";
pub const ACCESS_TOKEN_PREFIX: &str = "oauth2:accesstoken:";
pub const REFRESH_TOKEN_PREFIX: &str = "oauth2:refreshtoken:";
pub const CLIENT_PREFIX: &str = "oauth2:client:";
pub const SESSION_ACCESS_PREFIX: &str = "session:access:";
pub const SESSION_REFRESH_PREFIX: &str = "session:refresh:";

pub fn authorization_code(code: &str) -> String {
    format!("{AUTH_CODE_PREFIX}{code}")
}

pub fn access_token(token: &str) -> String {
    format!("{ACCESS_TOKEN_PREFIX}{token}")
}

pub fn refresh_token(token: &str) -> String {
    format!("{REFRESH_TOKEN_PREFIX}{token}")
}

pub fn client(client_id: &str) -> String {
    format!("{CLIENT_PREFIX}{client_id}")
}

pub fn session_access(token: &str) -> String {
    format!("{SESSION_ACCESS_PREFIX}{token}")
}

pub fn session_refresh(token: &str) -> String {
    format!("{SESSION_REFRESH_PREFIX}{token}")
}
