//! Reconciliation of the catalog against the external organisation source.
//!
//! [`handler::ReconciliationHandler`] drives one run: fetch the observed
//! snapshot, refresh the mapping table, build the desired hierarchy, then
//! either bulk-load an empty catalog or compare and apply the differences.

pub mod applier;
pub mod error;
pub mod handler;
pub mod mapping_refresh;
pub mod snapshot;
pub mod summary;

pub use applier::{ApplyFailure, ApplyStats, ChangeApplier};
pub use error::{ReconcileError, ReconcileResult};
pub use handler::{ReconciliationHandler, SyncOptions, SyncPhase};
pub use mapping_refresh::{refresh_mapping, MappingRefreshStats, RefreshScope};
pub use summary::{SyncCounts, SyncStatus, SyncSummary};
