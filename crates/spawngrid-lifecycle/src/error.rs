//! Lifecycle error types.

use std::time::Duration;

use spawngrid_core::ValidationError;
use spawngrid_scheduler::SpecError;
use spawngrid_transport::RemoteError;
use thiserror::Error;

/// Errors surfaced by `start` and the other orchestrator operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid workload parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to render job spec: {0}")]
    Render(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("job {job_id} is dead")]
    WorkloadDead { job_id: String },

    #[error("{count} healthy instances registered for {service}, expected one")]
    AmbiguousService { service: String, count: usize },

    #[error("service {service} not found after {attempts} attempts")]
    ServiceNotFound { service: String, attempts: u32 },

    #[error("job {job_id} not running after {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("workload already started")]
    AlreadyStarted,

    #[error("no workload started")]
    NotStarted,
}

impl From<SpecError> for LifecycleError {
    fn from(e: SpecError) -> Self {
        match e {
            SpecError::Validation(v) => LifecycleError::Validation(v),
            SpecError::Render(msg) => LifecycleError::Render(msg),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
