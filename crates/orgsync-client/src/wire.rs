//! Catalog wire types.
//!
//! Typed values are converted to these shapes only at the client boundary.

use orgsync_core::InternalId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// `_type` of organisational-unit collections.
pub const COLLECTION_TYPE: &str = "Collection";

/// Stereotype marking a collection as an organisational unit.
pub const ORG_UNIT_STEREOTYPE: &str = "Organisationseinheit";

/// How to address a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// By catalog-assigned id.
    Id(InternalId),
    /// By escaped business-key path of the entity itself.
    Path(String),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Path(path) => write!(f, "path:{path}"),
        }
    }
}

/// Entity as returned by the catalog.
///
/// The REST endpoints nest custom properties under `customProperties`, the
/// download endpoint flattens them into the top level. [`Self::property`]
/// looks in both places.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereotype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_collection: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CatalogEntity {
    /// Custom property as a string. Numbers are stringified, blanks are `None`.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<String> {
        self.custom_properties
            .get(name)
            .or_else(|| self.extra.get(name))
            .and_then(value_as_string)
    }

    #[must_use]
    pub fn is_type(&self, entity_type: &str) -> bool {
        self.entity_type.as_deref() == Some(entity_type)
    }

    #[must_use]
    pub fn has_stereotype(&self, stereotype: &str) -> bool {
        self.stereotype.as_deref() == Some(stereotype)
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Body sent when creating, updating, or bulk-uploading an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPayload {
    #[serde(rename = "_type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereotype: Option<String>,
    /// Parent reference: business key for uploads, id for moves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_collection: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: BTreeMap<String, String>,
}

impl EntityPayload {
    /// Payload with only the fixed type fields set.
    #[must_use]
    pub fn org_unit() -> Self {
        Self {
            entity_type: COLLECTION_TYPE.to_string(),
            label: None,
            stereotype: Some(ORG_UNIT_STEREOTYPE.to_string()),
            in_collection: None,
            custom_properties: BTreeMap::new(),
        }
    }
}

/// Update verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PATCH: only the fields present are changed.
    Partial,
    /// PUT: the entity is replaced.
    Replace,
}

/// Bulk upload operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Add,
    Replace,
    FullLoad,
}

impl UploadMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Replace => "REPLACE",
            Self::FullLoad => "FULL_LOAD",
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a bulk upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMessage {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

impl UploadMessage {
    /// `ERROR` messages mark a rejected entity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("ERROR")
    }
}
