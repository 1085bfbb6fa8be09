//! Persisted session records.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use spawngrid_core::WorkloadIdentity;

/// One user session and the workload it owns, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub tenant: String,
    /// Empty for the tenant's default session.
    pub session: String,
    /// Set after submit, cleared on stop.
    pub identity: Option<WorkloadIdentity>,
    /// Dynamic volume created for this session. Outlives `stop`.
    pub volume_id: Option<String>,
    /// Last known lifecycle phase, e.g. `running`.
    pub phase: String,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}

impl SessionRecord {
    pub fn new(tenant: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            session: session.into(),
            identity: None,
            volume_id: None,
            phase: "not_started".to_string(),
            updated_at: now_epoch_secs(),
        }
    }

    /// Composite key for the sessions table.
    pub fn table_key(&self) -> String {
        session_key(&self.tenant, &self.session)
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = now_epoch_secs();
    }
}

/// `{tenant}/{session}`.
pub fn session_key(tenant: &str, session: &str) -> String {
    format!("{tenant}/{session}")
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
