//! Job spec rendering errors.

use spawngrid_core::ValidationError;
use thiserror::Error;

/// Errors from building a job spec.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("template render error: {0}")]
    Render(String),
}

pub type SpecResult<T> = Result<T, SpecError>;
