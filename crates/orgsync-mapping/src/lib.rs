//! Persistent mapping between external identifiers and catalog identifiers.
//!
//! One CSV table per (database, scheme) pair. The table is a cache: it can be
//! rebuilt from the catalog at any time, so a damaged file degrades to an
//! empty table instead of failing the run.

pub mod error;
pub mod store;

pub use error::{MappingError, MappingResult};
pub use store::{MappingEntry, MappingStore, MappingTable};
