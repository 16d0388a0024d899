//! Error types for hierarchy construction and comparison.

use std::fmt;
use thiserror::Error;

/// Where a set of records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    /// The authoritative external source.
    Source,
    /// The catalog's observed snapshot.
    Catalog,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source records"),
            Self::Catalog => write!(f, "catalog snapshot"),
        }
    }
}

/// Data errors that make any reconciliation computed on top of them wrong.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    /// No record without a parent survived validation.
    #[error("no root nodes found, hierarchy cannot be built")]
    NoRootNodes,

    /// The same external id appears more than once.
    #[error("duplicate external id '{external_id}' in {origin}")]
    DuplicateExternalId {
        external_id: String,
        origin: RecordOrigin,
    },

    /// An internal id does not have the canonical UUID shape.
    #[error("invalid internal id '{0}': expected lowercase 8-4-4-4-12 hex UUID")]
    InvalidInternalId(String),

    /// A business-key path could not be decoded.
    #[error("invalid business key '{key}': {reason}")]
    InvalidBusinessKey { key: String, reason: String },
}

/// Result type alias for hierarchy operations.
pub type HierarchyResult<T> = Result<T, HierarchyError>;
