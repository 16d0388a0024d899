//! HTTP collaborators for organisation sync.
//!
//! [`catalog::CatalogClient`] and [`source::SourceClient`] are the seams the
//! reconciliation engine talks to; [`catalog::DataspotClient`] and
//! [`source::OdsClient`] are their reqwest implementations.

pub mod auth;
pub mod catalog;
pub mod error;
pub mod retry;
pub mod source;
pub mod wire;

pub use catalog::{CatalogClient, DataspotClient};
pub use error::{ClientError, ClientResult};
pub use source::{fetch_all_records, OdsClient, SourceClient};
pub use wire::{CatalogEntity, EntityPayload, EntityRef, UpdateMode, UploadMessage, UploadMode};
