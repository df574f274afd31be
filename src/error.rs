//! Pipeline error types.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors surfaced by the vision fog pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FogError {
    /// A required collaborator was not provided at configuration time
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// More observers than slots; the excess is dropped
    #[error("{requested} sources registered, capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },
    /// A resource exists but is not usable yet (or any more)
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
    /// Zero-length forward vector or non-positive aspect ratio
    #[error("invalid projection input: {0}")]
    InvalidProjectionInput(String),
    #[error("operation `{operation}` not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type FogResult<T> = Result<T, FogError>;
