//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when validating a display update.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Object name was empty or whitespace only
    #[error("object name must not be blank")]
    BlankObjectName,

    /// Object name is neither the sentinel nor known to the catalog
    #[error("unknown object name: {name}")]
    UnknownObject { name: String },

    /// Probability was NaN or infinite
    #[error("invalid probability {value} (expected a finite number)")]
    InvalidProbability { value: f64 },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
