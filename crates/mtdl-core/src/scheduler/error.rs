//! Errors surfaced by the engine boundary.

use crate::url_model::UrlError;

/// Why `submit` refused a URL.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),
    #[error("{0} is already queued, active, or completed")]
    Duplicate(String),
    #[error("engine is shutting down")]
    ShuttingDown,
}

/// A capacity bound was found violated. Reported and logged, never panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityExceeded {
    #[error("{admitted} downloads admitted or probing, limit is {max}")]
    Downloads { admitted: usize, max: usize },
    #[error("{live} workers live, limit is {max}")]
    Workers { live: usize, max: usize },
}
