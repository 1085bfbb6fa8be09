//! SessionStore — redb-backed persistence of workload identities.
//!
//! Supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::SESSIONS;
use crate::types::{SessionRecord, session_key};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe session store backed by redb.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
}

impl SessionStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// Missing parent directories are created. Fails with
    /// `StateError::Busy` while another process has the file open.
    pub fn open(path: &Path) -> StateResult<Self> {
        let open_error = |reason: String| StateError::Open {
            path: path.display().to_string(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_error(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Busy(path.display().to_string()),
            other => open_error(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "session store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StateError::Open {
                path: ":memory:".to_string(),
                reason: e.to_string(),
            })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory session store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SESSIONS).map_err(map_err!(Storage))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update a session record, refreshing `updated_at`.
    pub fn put_session(&self, record: &SessionRecord) -> StateResult<()> {
        let mut record = record.clone();
        record.touch();
        let key = record.table_key();
        let value = serde_json::to_vec(&record).map_err(|e| StateError::Encode {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SESSIONS).map_err(map_err!(Storage))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, phase = %record.phase, "session stored");
        Ok(())
    }

    /// Get a session by tenant and session name.
    pub fn get_session(&self, tenant: &str, session: &str) -> StateResult<Option<SessionRecord>> {
        let key = session_key(tenant, session);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SESSIONS).map_err(map_err!(Storage))?;
        match table.get(key.as_str()).map_err(map_err!(Storage))? {
            Some(guard) => decode(&key, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// List all sessions, ordered by key.
    pub fn list_sessions(&self) -> StateResult<Vec<SessionRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SESSIONS).map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            results.push(decode(key.value(), value.value())?);
        }
        Ok(results)
    }

    /// Drop the workload identity but keep the record and its volume.
    pub fn clear_identity(&self, tenant: &str, session: &str, phase: &str) -> StateResult<()> {
        let mut record = self
            .get_session(tenant, session)?
            .ok_or_else(|| StateError::NotFound {
                tenant: tenant.to_string(),
                session: session.to_string(),
            })?;
        record.identity = None;
        record.phase = phase.to_string();
        self.put_session(&record)
    }

    /// Delete a session. Returns true if it existed.
    pub fn delete_session(&self, tenant: &str, session: &str) -> StateResult<bool> {
        let key = session_key(tenant, session);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SESSIONS).map_err(map_err!(Storage))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Storage))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "session deleted");
        Ok(existed)
    }
}

fn decode(key: &str, bytes: &[u8]) -> StateResult<SessionRecord> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
