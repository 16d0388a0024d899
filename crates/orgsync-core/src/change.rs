//! Typed change-set produced by the comparer.

use crate::ids::InternalId;
use crate::node::DesiredNode;
use crate::EXTERNAL_URL_PROPERTY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields the comparer inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Label,
    ExternalUrl,
    ParentPath,
}

impl ChangedField {
    /// Catalog-side name of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::ExternalUrl => EXTERNAL_URL_PROPERTY,
            Self::ParentPath => "inCollection",
        }
    }
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after pair for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old: Option<String>,
    pub new: Option<String>,
}

pub type FieldDiffs = BTreeMap<ChangedField, FieldDiff>;

/// An existing entity whose fields differ from the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateChange {
    pub external_id: String,
    pub internal_id: InternalId,
    pub desired: DesiredNode,
    pub field_diffs: FieldDiffs,
}

impl UpdateChange {
    /// True when the label is the only difference.
    #[must_use]
    pub fn is_label_only(&self) -> bool {
        self.field_diffs.len() == 1 && self.field_diffs.contains_key(&ChangedField::Label)
    }

    /// True when the entity moves to a different parent.
    #[must_use]
    pub fn is_move(&self) -> bool {
        self.field_diffs.contains_key(&ChangedField::ParentPath)
    }
}

/// An observed entity with no desired counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteChange {
    pub external_id: String,
    pub internal_id: InternalId,
    pub label: String,
    pub last_known_path: Option<String>,
}

/// One unit of work for the applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    Create(DesiredNode),
    Update(UpdateChange),
    Delete(DeleteChange),
}

impl Change {
    #[must_use]
    pub fn external_id(&self) -> &str {
        match self {
            Self::Create(node) => &node.external_id,
            Self::Update(update) => &update.external_id,
            Self::Delete(delete) => &delete.external_id,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Create(node) => &node.label,
            Self::Update(update) => &update.desired.label,
            Self::Delete(delete) => &delete.label,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}
