//! Error types for the router.

use thiserror::Error;

/// Errors from target selection.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Every target in the class is currently unhealthy. Expected under
    /// full outage; surfaced to callers as 503 once retries run out.
    #[error("no healthy {0} targets available")]
    NoHealthyTarget(String),

    /// The class was never configured. Surfaced as 404, never retried.
    #[error("unknown service class: {0}")]
    UnknownClass(String),
}
