//! Remote error type shared by both backends.

use thiserror::Error;

/// Result type alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A failed call to the scheduler or registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The backend answered with a non-2xx status.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response.
    #[error("{method} {path} failed: {reason}")]
    Transport {
        method: String,
        path: String,
        reason: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response from {path}: {reason}")]
    Decode { path: String, reason: String },

    /// The request could not be built.
    #[error("invalid request: {0}")]
    Request(String),

    /// A lookup did not yield exactly one result.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// TLS material could not be loaded.
    #[error("tls configuration error: {0}")]
    Tls(String),
}

impl RemoteError {
    /// HTTP status, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body, if the backend answered.
    pub fn body(&self) -> Option<&str> {
        match self {
            RemoteError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Whether the backend reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
