//! In-process [`DurableStore`] with an outage switch.
//!
//! Each operation runs under one mutex, which gives the same all-or-nothing
//! behavior the PostgreSQL statements provide.

use super::DurableStore;
use crate::errors::AuthError;
use crate::models::{
    AuthorizationCode, OAuthClient, SessionAccess, SessionGrant, SessionRecord, SessionRefresh,
    SweepCounts, Token, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct UserRow {
    credentials: UserCredentials,
    refresh_token: Option<String>,
    refresh_expires_at: Option<DateTime<Utc>>,
    access_token: Option<String>,
    access_expires_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn session_record(&self) -> SessionRecord {
        SessionRecord {
            user_id: self.credentials.user_id,
            refresh_token: self.refresh_token.clone(),
            access_token: self.access_token.clone(),
        }
    }

    fn install(&mut self, grant: &SessionGrant) {
        self.refresh_token = Some(grant.refresh_token.clone());
        self.refresh_expires_at = Some(grant.refresh_expires_at);
        self.access_token = Some(grant.access_token.clone());
        self.access_expires_at = Some(grant.access_expires_at);
    }
}

#[derive(Debug, Default)]
struct Tables {
    codes: HashMap<String, AuthorizationCode>,
    tokens: HashMap<String, Token>,
    clients: HashMap<String, OAuthClient>,
    users: HashMap<Uuid, UserRow>,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of store operations attempted, including pings.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn add_user(&self, credentials: UserCredentials) {
        self.lock().users.insert(
            credentials.user_id,
            UserRow {
                credentials,
                refresh_token: None,
                refresh_expires_at: None,
                access_token: None,
                access_expires_at: None,
            },
        );
    }

    pub fn set_user_active(&self, user_id: Uuid, is_active: bool) {
        if let Some(row) = self.lock().users.get_mut(&user_id) {
            row.credentials.is_active = is_active;
        }
    }

    /// Raw code row regardless of state.
    pub fn authorization_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.lock().codes.get(code).cloned()
    }

    pub fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(self.lock())
        } else {
            Err(AuthError::DurableStoreUnavailable(
                "durable store offline".to_string(),
            ))
        }
    }
}

fn redeemable(code: &AuthorizationCode, now: DateTime<Utc>) -> bool {
    !code.used && code.expires_at > now
}

fn find_by_refresh<'a>(tables: &'a Tables, refresh_token: &str) -> Option<&'a Token> {
    tables
        .tokens
        .values()
        .find(|t| t.refresh_token.as_deref() == Some(refresh_token))
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn ping(&self) -> Result<(), AuthError> {
        self.tables().map(|_| ())
    }

    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), AuthError> {
        let mut tables = self.tables()?;
        if tables.codes.contains_key(&code.code) {
            return Err(AuthError::Internal("duplicate authorization code".to_string()));
        }
        tables.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn find_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, AuthError> {
        Ok(self
            .tables()?
            .codes
            .get(code)
            .filter(|c| redeemable(c, now))
            .cloned())
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, AuthError> {
        let mut tables = self.tables()?;
        match tables.codes.get_mut(code) {
            Some(row) if redeemable(row, now) => {
                row.used = true;
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<bool, AuthError> {
        Ok(self.tables()?.codes.remove(code).is_some())
    }

    async fn insert_token(&self, token: &Token) -> Result<(), AuthError> {
        let mut tables = self.tables()?;
        if tables.tokens.contains_key(&token.access_token) {
            return Err(AuthError::Internal("duplicate access token".to_string()));
        }
        tables
            .tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, AuthError> {
        Ok(self.tables()?.tokens.get(access_token).cloned())
    }

    async fn find_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, AuthError> {
        let tables = self.tables()?;
        Ok(find_by_refresh(&tables, refresh_token).cloned())
    }

    async fn replace_token(
        &self,
        old_refresh: &str,
        new: &Token,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>, AuthError> {
        let mut tables = self.tables()?;
        let old_access = match find_by_refresh(&tables, old_refresh) {
            Some(old) if old.refresh_valid_at(now) => old.access_token.clone(),
            _ => return Ok(None),
        };

        let old = tables.tokens.remove(&old_access);
        tables.tokens.insert(new.access_token.clone(), new.clone());
        Ok(old)
    }

    async fn delete_token_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<Token>, AuthError> {
        Ok(self.tables()?.tokens.remove(access_token))
    }

    async fn delete_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, AuthError> {
        let mut tables = self.tables()?;
        let Some(access) = find_by_refresh(&tables, refresh_token).map(|t| t.access_token.clone())
        else {
            return Ok(None);
        };
        Ok(tables.tokens.remove(&access))
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, AuthError> {
        Ok(self
            .tables()?
            .clients
            .get(client_id)
            .filter(|client| client.is_active)
            .cloned())
    }

    async fn upsert_client(&self, client: &OAuthClient) -> Result<(), AuthError> {
        self.tables()?
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|row| row.credentials.username == username)
            .map(|row| row.credentials.clone()))
    }

    async fn record_login(&self, grant: &SessionGrant) -> Result<Option<SessionRecord>, AuthError> {
        let mut tables = self.tables()?;
        Ok(tables.users.get_mut(&grant.user_id).map(|row| {
            let previous = row.session_record();
            row.install(grant);
            previous
        }))
    }

    async fn rotate_user_session(
        &self,
        old_refresh: &str,
        grant: &SessionGrant,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, AuthError> {
        let mut tables = self.tables()?;
        let Some(row) = tables.users.get_mut(&grant.user_id) else {
            return Ok(None);
        };

        let live = row.credentials.is_active
            && row.refresh_token.as_deref() == Some(old_refresh)
            && row.refresh_expires_at.is_some_and(|exp| exp > now);
        if !live {
            return Ok(None);
        }

        let previous = row.session_record();
        row.install(grant);
        Ok(Some(previous))
    }

    async fn find_session_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<SessionAccess>, AuthError> {
        Ok(self.tables()?.users.values().find_map(|row| {
            let matches =
                row.credentials.is_active && row.access_token.as_deref() == Some(access_token);
            match (matches, row.access_expires_at) {
                (true, Some(access_expires_at)) => Some(SessionAccess {
                    user_id: row.credentials.user_id,
                    access_expires_at,
                }),
                _ => None,
            }
        }))
    }

    async fn find_session_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRefresh>, AuthError> {
        Ok(self.tables()?.users.values().find_map(|row| {
            let matches =
                row.credentials.is_active && row.refresh_token.as_deref() == Some(refresh_token);
            match (matches, row.refresh_expires_at) {
                (true, Some(refresh_expires_at)) => Some(SessionRefresh {
                    user_id: row.credentials.user_id,
                    refresh_expires_at,
                }),
                _ => None,
            }
        }))
    }

    async fn clear_user_session(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionRecord>, AuthError> {
        let mut tables = self.tables()?;
        Ok(tables
            .users
            .values_mut()
            .find(|row| row.refresh_token.as_deref() == Some(refresh_token))
            .map(|row| {
                let previous = row.session_record();
                row.refresh_token = None;
                row.refresh_expires_at = None;
                row.access_token = None;
                row.access_expires_at = None;
                previous
            }))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<SweepCounts, AuthError> {
        let mut tables = self.tables()?;

        let codes_before = tables.codes.len();
        tables.codes.retain(|_, c| redeemable(c, now));
        let tokens_before = tables.tokens.len();
        tables
            .tokens
            .retain(|_, t| t.access_valid_at(now) || t.refresh_valid_at(now));

        let mut sessions = 0;
        for row in tables.users.values_mut() {
            let expired = row.refresh_expires_at.is_some_and(|at| at <= now);
            if expired {
                row.refresh_token = None;
                row.refresh_expires_at = None;
                row.access_token = None;
                row.access_expires_at = None;
                sessions += 1;
            }
        }

        Ok(SweepCounts {
            authorization_codes: (codes_before - tables.codes.len()) as u64,
            tokens: (tokens_before - tables.tokens.len()) as u64,
            sessions,
        })
    }
}
