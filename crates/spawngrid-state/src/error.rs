//! Session store errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open session store {path}: {reason}")]
    Open { path: String, reason: String },

    /// Another process holds the database lock.
    #[error("session store {0} is in use by another process")]
    Busy(String),

    #[error("session store transaction failed: {0}")]
    Transaction(String),

    #[error("session table error: {0}")]
    Storage(String),

    #[error("cannot encode session {key}: {reason}")]
    Encode { key: String, reason: String },

    /// A stored record no longer parses as a `SessionRecord`.
    #[error("corrupt session record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("session {tenant}/{session} not found")]
    NotFound { tenant: String, session: String },
}

impl StateError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StateError::Busy(_))
    }
}
