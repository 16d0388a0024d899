//! Mapping store errors.

use thiserror::Error;

/// Errors returned by [`crate::MappingStore`] mutations.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A required field was empty. The store was not modified.
    #[error("mapping rejected: {0} must not be empty")]
    EmptyField(&'static str),

    /// The internal id is not a canonical UUID. The store was not modified.
    #[error("mapping rejected: invalid internal id '{0}'")]
    InvalidInternalId(String),

    /// Writing the table to disk failed. The in-memory table holds the change.
    #[error("failed to persist mapping table: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode mapping table: {0}")]
    Csv(#[from] csv::Error),
}

impl MappingError {
    /// True for validation failures that left the store untouched.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::EmptyField(_) | Self::InvalidInternalId(_))
    }
}

/// Result type alias for mapping store operations.
pub type MappingResult<T> = Result<T, MappingError>;
