//! Session Persistence
//!
//! Serializes workflow snapshots to a durable key-value store behind the
//! `SessionStore` capability. Records carry a schema version; anything
//! unreadable or stale is discarded silently so the workflow starts fresh
//! instead of surfacing a persistence error to the user.

use std::sync::Arc;

use tracing::debug;

use crate::models::session::{WorkflowSession, SESSION_SCHEMA_VERSION};
use crate::storage::Database;
use crate::utils::error::AppResult;

/// Key the workflow session is stored under.
pub const DEFAULT_SESSION_KEY: &str = "workflow_session";

/// Durable string-blob store. Injectable so the controller is testable
/// without a real database.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

impl SessionStore for Database {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.kv_get(key)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.kv_set(key, value)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.kv_remove(key)
    }
}

/// Versioned persistence over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionPersistence {
    store: Arc<dyn SessionStore>,
    key: String,
}

impl SessionPersistence {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_key(store, DEFAULT_SESSION_KEY)
    }

    pub fn with_key(store: Arc<dyn SessionStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Write a snapshot. An all-empty session is never written; returns
    /// whether a record was stored.
    pub fn save(&self, session: &WorkflowSession) -> AppResult<bool> {
        if session.is_empty() {
            return Ok(false);
        }
        let blob = serde_json::to_string(session)?;
        self.store.set(&self.key, &blob)?;
        Ok(true)
    }

    /// Read back the stored snapshot, if one exists and matches the current
    /// schema version. Corrupted or stale records are removed and reported
    /// as absent.
    pub fn restore(&self) -> AppResult<Option<WorkflowSession>> {
        let Some(blob) = self.store.get(&self.key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<WorkflowSession>(&blob) {
            Ok(session) if session.version == SESSION_SCHEMA_VERSION => Ok(Some(session)),
            Ok(session) => {
                debug!(
                    "discarding persisted session with schema version {} (current {})",
                    session.version, SESSION_SCHEMA_VERSION
                );
                self.store.remove(&self.key)?;
                Ok(None)
            }
            Err(e) => {
                debug!("discarding unreadable persisted session: {}", e);
                self.store.remove(&self.key)?;
                Ok(None)
            }
        }
    }

    /// Remove the stored snapshot.
    pub fn clear(&self) -> AppResult<()> {
        self.store.remove(&self.key)
    }
}
