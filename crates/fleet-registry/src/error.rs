//! Error types for the registry.

use thiserror::Error;

/// Result type alias for directory operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur against the membership directory.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required field was missing or empty. Surfaced as 400.
    #[error("missing required fields: {0}")]
    Validation(String),

    /// No record under the given service id. Surfaced as 404.
    #[error("service not found: {0}")]
    NotFound(String),
}
