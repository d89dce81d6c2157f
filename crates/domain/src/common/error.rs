use thiserror::Error;

use crate::forwarding::error::ForwardingError;
use crate::twamp::error::TwampError;

/// Error kinds surfaced by core operations, across all subsystems.
///
/// Module-specific errors (`ForwardingError`, `TwampError`) convert into
/// these kinds at the service boundary so callers can match on category
/// without knowing which engine produced the failure.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rule '{rule}' conflicts with active rule '{existing}'")]
    Conflict { rule: String, existing: String },

    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("kernel operation '{op}' failed: {detail}")]
    Kernel { op: String, detail: String },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("operation canceled")]
    Canceled,
}

impl From<ForwardingError> for CoreError {
    fn from(e: ForwardingError) -> Self {
        match e {
            ForwardingError::NotFound { name } => Self::NotFound(name),
            ForwardingError::Conflict { name, existing } => Self::Conflict {
                rule: name,
                existing,
            },
            ForwardingError::StillActive { .. }
            | ForwardingError::AlreadyInState { .. }
            | ForwardingError::InverseManaged { .. } => Self::StateViolation(e.to_string()),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl From<TwampError> for CoreError {
    fn from(e: TwampError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}
