//! Reconciliation errors.

use orgsync_client::ClientError;
use orgsync_core::{HierarchyError, InternalId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Data error that invalidates the whole run.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// Transport or API failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("unit {external_id} cannot be moved to the scheme root")]
    RootMoveUnsupported { external_id: String },

    #[error("move target '{path}' for unit {external_id} does not exist")]
    MoveTargetNotFound { external_id: String, path: String },

    #[error("unit {external_id} ({internal_id}) no longer exists in the catalog")]
    EntityVanished {
        external_id: String,
        internal_id: InternalId,
    },
}

/// Result type alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
