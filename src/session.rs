//! Time-boxed login session kept in a [`KeyValueStore`].
//!
//! Validation is purely local and uses the caller's clock; nothing is revoked
//! server-side.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Credential;
use crate::store::{KeyValueStore, StoreError};

pub const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub login_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    key: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn login(
        &self,
        store: &dyn KeyValueStore,
        credentials: &[Credential],
        username: &str,
        password: &str,
    ) -> Result<Session, SessionError> {
        if !credentials.iter().any(|c| c.matches(username, password)) {
            debug!(username, "login rejected");
            return Err(SessionError::InvalidCredentials);
        }
        self.create_session(store, username)
    }

    pub fn create_session(
        &self,
        store: &dyn KeyValueStore,
        username: &str,
    ) -> Result<Session, SessionError> {
        self.create_session_at(store, username, Utc::now())
    }

    pub fn create_session_at(
        &self,
        store: &dyn KeyValueStore,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let session = Session {
            username: username.to_string(),
            login_time: now,
            expires_at: now + self.ttl,
        };
        store.set(&self.key, &serde_json::to_string(&session)?)?;
        Ok(session)
    }

    pub fn is_valid(&self, store: &dyn KeyValueStore) -> bool {
        self.is_valid_at(store, Utc::now())
    }

    /// Absent, expired and unreadable sessions are all "not logged in"; the
    /// latter two are cleared on the way out.
    pub fn is_valid_at(&self, store: &dyn KeyValueStore, now: DateTime<Utc>) -> bool {
        self.valid_session_at(store, now).is_some()
    }

    pub fn valid_session_at(
        &self,
        store: &dyn KeyValueStore,
        now: DateTime<Utc>,
    ) -> Option<Session> {
        let raw = match store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                return None;
            }
        };
        let session = match serde_json::from_str::<Session>(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "discarding unreadable session");
                self.clear_quietly(store);
                return None;
            }
        };
        if session.is_expired_at(now) {
            debug!(username = %session.username, "session expired");
            self.clear_quietly(store);
            return None;
        }
        Some(session)
    }

    /// Parsed session without any expiry check.
    pub fn current(&self, store: &dyn KeyValueStore) -> Option<Session> {
        store
            .get(&self.key)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn destroy(&self, store: &dyn KeyValueStore) -> Result<(), SessionError> {
        store.remove(&self.key)?;
        Ok(())
    }

    fn clear_quietly(&self, store: &dyn KeyValueStore) {
        if let Err(e) = store.remove(&self.key) {
            warn!(error = %e, "failed to clear session");
        }
    }
}
