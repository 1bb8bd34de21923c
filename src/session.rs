//! Credential and continuation storage.
//!
//! The access token lives in durable storage, the PKCE verifier of the login
//! attempt in session storage. Both are reached through a `CredentialStore`
//! handed to whoever needs them.
use crate::db::{self, StorageScope};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const CODE_VERIFIER_KEY: &str = "code_verifier";
/// A login attempt left unfinished for longer than this is abandoned.
pub const SESSION_MAX_AGE_SECS: i64 = 600;

/// Minimal string key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One scope of the SQLite database. A connection is opened per call.
pub struct SqliteStore {
    db_path: PathBuf,
    scope: StorageScope,
}

impl SqliteStore {
    pub fn new(db_path: PathBuf, scope: StorageScope) -> Result<Self> {
        db::open_or_create(&db_path)?;
        Ok(Self { db_path, scope })
    }

    fn conn(&self) -> Result<rusqlite::Connection> {
        Ok(rusqlite::Connection::open(&self.db_path)?)
    }

    /// Drop entries not written in the last `max_age_secs` seconds.
    pub fn prune_older_than(&self, max_age_secs: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp().saturating_sub(max_age_secs);
        db::prune_older_than(&self.conn()?, self.scope, cutoff)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        db::get_value(&self.conn()?, self.scope, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        db::set_value(&self.conn()?, self.scope, key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        db::remove_value(&self.conn()?, self.scope, key)?;
        Ok(())
    }
}

/// In-memory store; contents die with the process.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64, // epoch seconds
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Process-wide session state made explicit: created at login, read by every
/// authenticated call, destroyed at logout or when the provider rejects it.
#[derive(Clone)]
pub struct CredentialStore {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, session }
    }

    /// Both scopes backed by the same SQLite file. Session entries older than
    /// `SESSION_MAX_AGE_SECS` are discarded on open.
    pub fn open(db_path: PathBuf) -> Result<Self> {
        let durable = SqliteStore::new(db_path.clone(), StorageScope::Durable)?;
        let session = SqliteStore::new(db_path, StorageScope::Session)?;
        let expired = session.prune_older_than(SESSION_MAX_AGE_SECS)?;
        if expired > 0 {
            debug!("discarded {} stale session entries", expired);
        }
        Ok(Self::new(Arc::new(durable), Arc::new(session)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Durable scope, for other persisted client state (favorites).
    pub fn durable(&self) -> &dyn KeyValueStore {
        self.durable.as_ref()
    }

    pub fn token(&self) -> Result<Option<StoredToken>> {
        match self.durable.get(ACCESS_TOKEN_KEY)? {
            Some(s) => {
                let st: StoredToken =
                    serde_json::from_str(&s).map_err(|e| anyhow!("parse token json: {}", e))?;
                Ok(Some(st))
            }
            None => Ok(None),
        }
    }

    /// Stored token that has not passed its expiry.
    pub fn valid_token(&self) -> Result<Option<StoredToken>> {
        Ok(self.token()?.filter(|t| !t.is_expired()))
    }

    pub fn save_token(&self, token: &StoredToken) -> Result<()> {
        self.durable.set(ACCESS_TOKEN_KEY, &serde_json::to_string(token)?)
    }

    pub fn clear_token(&self) -> Result<()> {
        debug!("clearing stored access token");
        self.durable.remove(ACCESS_TOKEN_KEY)
    }

    pub fn code_verifier(&self) -> Result<Option<String>> {
        Ok(self.session.get(CODE_VERIFIER_KEY)?.filter(|v| !v.is_empty()))
    }

    pub fn save_code_verifier(&self, verifier: &str) -> Result<()> {
        self.session.set(CODE_VERIFIER_KEY, verifier)
    }

    pub fn clear_code_verifier(&self) -> Result<()> {
        self.session.remove(CODE_VERIFIER_KEY)
    }

    pub fn logout(&self) -> Result<()> {
        self.clear_token()?;
        self.clear_code_verifier()
    }
}
