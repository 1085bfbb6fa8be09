//! Validation errors for workload parameters.

use thiserror::Error;

/// Bad input parameters. Never retried: the calling operation fails
/// immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("image must not be empty")]
    EmptyImage,

    #[error("at least one datacenter is required")]
    NoDatacenters,

    #[error("memory must be greater than zero")]
    ZeroMemory,

    #[error("{kind} volume is missing required field `{field}`")]
    MissingVolumeField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("unknown volume type: {0}")]
    UnknownVolumeType(String),

    #[error("only {limit} MB allowed, requested {requested} MB")]
    MemoryLimitExceeded { requested: u64, limit: u64 },

    #[error("invalid datacenters list {0:?}")]
    DatacenterNotAllowed(Vec<String>),

    #[error("invalid CSI plugin {0}")]
    PluginNotAllowed(String),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidOption { field: &'static str, reason: String },
}
