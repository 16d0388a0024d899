//! Core model for organisation-hierarchy reconciliation.
//!
//! Turns a flat set of externally sourced records into a layered tree of
//! desired catalog nodes, and diffs that tree against an observed catalog
//! snapshot to produce a typed change-set. Everything here is pure; network
//! and file I/O live in the sibling crates.

pub mod business_key;
pub mod change;
pub mod comparer;
pub mod error;
pub mod ids;
pub mod node;
pub mod record;
pub mod transformer;

pub use change::{Change, ChangedField, DeleteChange, FieldDiff, FieldDiffs, UpdateChange};
pub use comparer::StructureComparer;
pub use error::{HierarchyError, HierarchyResult, RecordOrigin};
pub use ids::InternalId;
pub use node::{DesiredHierarchy, DesiredNode, ObservedNode, ObservedSnapshot};
pub use record::{ExternalRecord, RecordPage};
pub use transformer::{HierarchyTransformer, TransformWarning, MAX_DEPTH};

/// Custom property carrying the external (Staatskalender) identifier.
pub const EXTERNAL_ID_PROPERTY: &str = "id_im_staatskalender";

/// Custom property carrying the external URL of a unit.
pub const EXTERNAL_URL_PROPERTY: &str = "link_zum_staatskalender";
