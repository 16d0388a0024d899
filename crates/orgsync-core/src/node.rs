//! Desired and observed node shapes.

use crate::business_key;
use crate::error::{HierarchyError, HierarchyResult, RecordOrigin};
use crate::ids::InternalId;
use crate::transformer::TransformWarning;
use crate::{EXTERNAL_ID_PROPERTY, EXTERNAL_URL_PROPERTY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A node the catalog should contain, computed fresh from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredNode {
    pub external_id: String,
    pub label: String,
    pub depth: usize,
    /// Escaped path of the ancestors' labels. `None` for roots.
    pub business_key_path: Option<String>,
    pub parent_external_id: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl DesiredNode {
    /// External URL custom property, if set.
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.properties.get(EXTERNAL_URL_PROPERTY).map(String::as_str)
    }

    /// Number of components in the parent path.
    #[must_use]
    pub fn parent_depth(&self) -> usize {
        business_key::path_depth(self.business_key_path.as_deref())
    }

    /// Escaped path addressing this node itself.
    #[must_use]
    pub fn own_path(&self) -> String {
        business_key::append_component(self.business_key_path.as_deref(), &self.label)
    }
}

/// Transformer output: nodes grouped by depth plus non-fatal findings.
#[derive(Debug, Clone, Default)]
pub struct DesiredHierarchy {
    layers: Vec<Vec<DesiredNode>>,
    warnings: Vec<TransformWarning>,
}

impl DesiredHierarchy {
    pub(crate) fn new(layers: Vec<Vec<DesiredNode>>, warnings: Vec<TransformWarning>) -> Self {
        Self { layers, warnings }
    }

    /// Layers ordered by depth, roots first.
    #[must_use]
    pub fn layers(&self) -> &[Vec<DesiredNode>] {
        &self.layers
    }

    /// All nodes, shallowest layer first.
    pub fn iter(&self) -> impl Iterator<Item = &DesiredNode> {
        self.layers.iter().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn warnings(&self) -> &[TransformWarning] {
        &self.warnings
    }

    /// External ids dropped because of a dangling ancestor.
    pub fn excluded_ids(&self) -> impl Iterator<Item = &str> {
        self.warnings.iter().filter_map(TransformWarning::excluded_id)
    }

    /// Consume into the layer vectors.
    #[must_use]
    pub fn into_layers(self) -> Vec<Vec<DesiredNode>> {
        self.layers
    }
}

/// A node as currently stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedNode {
    pub internal_id: InternalId,
    pub external_id: String,
    pub label: String,
    pub business_key_path: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl ObservedNode {
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.properties.get(EXTERNAL_URL_PROPERTY).map(String::as_str)
    }

    #[must_use]
    pub fn external_id_property(&self) -> Option<&str> {
        self.properties.get(EXTERNAL_ID_PROPERTY).map(String::as_str)
    }
}

/// Observed catalog state indexed by external id.
///
/// Iteration follows the order the catalog returned the entities in.
#[derive(Debug, Clone, Default)]
pub struct ObservedSnapshot {
    nodes: Vec<ObservedNode>,
    index: HashMap<String, usize>,
}

impl ObservedSnapshot {
    /// Build a snapshot, failing on the first repeated external id.
    pub fn from_nodes(nodes: Vec<ObservedNode>) -> HierarchyResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.external_id.clone(), position).is_some() {
                return Err(HierarchyError::DuplicateExternalId {
                    external_id: node.external_id.clone(),
                    origin: RecordOrigin::Catalog,
                });
            }
        }
        Ok(Self { nodes, index })
    }

    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<&ObservedNode> {
        self.index.get(external_id).map(|&i| &self.nodes[i])
    }

    #[must_use]
    pub fn contains(&self, external_id: &str) -> bool {
        self.index.contains_key(external_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservedNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
