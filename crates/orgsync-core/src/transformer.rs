//! Flat records to layered hierarchy.
//!
//! Records are indexed by id, dangling subtrees are excluded, and the
//! remaining forest is walked breadth-first from its roots. Each node's
//! business-key path is read from a memo table filled while the previous
//! layer was built, so no recursion is involved regardless of tree depth.

use crate::business_key;
use crate::error::{HierarchyError, HierarchyResult, RecordOrigin};
use crate::node::{DesiredHierarchy, DesiredNode};
use crate::record::ExternalRecord;
use crate::{EXTERNAL_ID_PROPERTY, EXTERNAL_URL_PROPERTY};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Upper bound on traversal depth. Guards against cycles the
/// reachability check did not catch.
pub const MAX_DEPTH: usize = 100;

/// Non-fatal findings collected while building the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformWarning {
    /// A record without an id was ignored.
    MissingId { position: usize },
    /// The record's parent is not in the record set. Record excluded.
    MissingParent { external_id: String, parent_id: String },
    /// Excluded because an ancestor has a missing parent.
    ExcludedDescendant { external_id: String, ancestor_id: String },
    /// A declared child id is not in the record set.
    MissingChild { external_id: String, child_id: String },
    /// Parent and child disagree about their relationship.
    UnconfirmedLink { parent_id: String, child_id: String },
    /// Several records declare the same parentless child.
    AmbiguousParent { external_id: String, declared_by: Vec<String> },
    /// Empty title, node skipped.
    MissingTitle { external_id: String },
    /// Never reached from a root, usually because of a cycle.
    Unreachable { external_id: String },
    /// Traversal stopped at [`MAX_DEPTH`] with nodes still pending.
    DepthLimitReached { max_depth: usize, pending: usize },
}

impl TransformWarning {
    /// External id removed from the output because of a dangling parent chain.
    #[must_use]
    pub fn excluded_id(&self) -> Option<&str> {
        match self {
            Self::MissingParent { external_id, .. }
            | Self::ExcludedDescendant { external_id, .. } => Some(external_id),
            _ => None,
        }
    }
}

impl fmt::Display for TransformWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId { position } => write!(f, "record at position {position} has no id"),
            Self::MissingParent { external_id, parent_id } => {
                write!(f, "record {external_id} references missing parent {parent_id}")
            }
            Self::ExcludedDescendant { external_id, ancestor_id } => write!(
                f,
                "record {external_id} excluded, ancestor {ancestor_id} has a missing parent"
            ),
            Self::MissingChild { external_id, child_id } => {
                write!(f, "record {external_id} declares unknown child {child_id}")
            }
            Self::UnconfirmedLink { parent_id, child_id } => write!(
                f,
                "link {parent_id} -> {child_id} is not confirmed by both records"
            ),
            Self::AmbiguousParent { external_id, declared_by } => write!(
                f,
                "record {external_id} is declared as child by {}",
                declared_by.join(", ")
            ),
            Self::MissingTitle { external_id } => write!(f, "record {external_id} has no title"),
            Self::Unreachable { external_id } => {
                write!(f, "record {external_id} is not reachable from any root")
            }
            Self::DepthLimitReached { max_depth, pending } => write!(
                f,
                "depth limit {max_depth} reached, {pending} deeper nodes not included"
            ),
        }
    }
}

/// Builds a [`DesiredHierarchy`] from a flat record set.
#[derive(Debug)]
pub struct HierarchyTransformer<'a> {
    records: Vec<&'a ExternalRecord>,
    index: HashMap<&'a str, usize>,
    warnings: Vec<TransformWarning>,
}

impl<'a> HierarchyTransformer<'a> {
    /// Index the records. A repeated id is a hard error.
    pub fn new(records: &'a [ExternalRecord]) -> HierarchyResult<Self> {
        let mut kept = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        let mut warnings = Vec::new();

        for (position, record) in records.iter().enumerate() {
            let id = record.id.as_str();
            if id.is_empty() {
                warnings.push(TransformWarning::MissingId { position });
                continue;
            }
            if index.insert(id, kept.len()).is_some() {
                return Err(HierarchyError::DuplicateExternalId {
                    external_id: id.to_string(),
                    origin: RecordOrigin::Source,
                });
            }
            kept.push(record);
        }

        Ok(Self {
            records: kept,
            index,
            warnings,
        })
    }

    /// Number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, id: &str) -> Option<&'a ExternalRecord> {
        self.index.get(id).map(|&i| self.records[i])
    }

    /// Build the layered hierarchy.
    pub fn transform(&self) -> HierarchyResult<DesiredHierarchy> {
        info!(records = self.records.len(), "Transforming records into hierarchy");

        let mut warnings = self.warnings.clone();
        let links = self.resolve_links(&mut warnings);
        let invalid = self.exclude_dangling_subtrees(&links, &mut warnings);

        let roots: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.id.as_str())
            .filter(|id| !links.parent_of.contains_key(id) && !invalid.contains(id))
            .collect();
        if roots.is_empty() {
            return Err(HierarchyError::NoRootNodes);
        }
        debug!(roots = roots.len(), "Resolved root nodes");

        let mut visited: HashSet<&str> = HashSet::new();
        // Escaped path of every emitted node, including its own label.
        let mut own_paths: HashMap<&str, String> = HashMap::new();
        let mut layers: Vec<Vec<DesiredNode>> = Vec::new();
        let mut frontier: Vec<(&str, Option<&str>)> = roots.iter().map(|&r| (r, None)).collect();

        for depth in 0..MAX_DEPTH {
            if frontier.is_empty() {
                break;
            }
            let mut layer = Vec::new();
            let mut next = Vec::new();

            for (id, parent) in frontier {
                if !visited.insert(id) {
                    continue;
                }
                let Some(record) = self.record(id) else {
                    continue;
                };
                let Some(label) = record.label() else {
                    push_warning(
                        &mut warnings,
                        TransformWarning::MissingTitle {
                            external_id: id.to_string(),
                        },
                    );
                    continue;
                };

                let parent_path = parent.and_then(|p| own_paths.get(p)).cloned();
                own_paths.insert(
                    id,
                    business_key::append_component(parent_path.as_deref(), label),
                );

                let mut properties = BTreeMap::new();
                properties.insert(EXTERNAL_ID_PROPERTY.to_string(), id.to_string());
                if let Some(url) = record.external_url() {
                    properties.insert(EXTERNAL_URL_PROPERTY.to_string(), url.to_string());
                }

                layer.push(DesiredNode {
                    external_id: id.to_string(),
                    label: label.to_string(),
                    depth,
                    business_key_path: parent_path,
                    parent_external_id: parent.map(str::to_string),
                    properties,
                });

                for &child in links.children.get(id).into_iter().flatten() {
                    if !visited.contains(child) && !invalid.contains(child) {
                        next.push((child, Some(id)));
                    }
                }
            }

            debug!(depth, nodes = layer.len(), "Built hierarchy layer");
            if !layer.is_empty() {
                layers.push(layer);
            }
            frontier = next;
        }

        if !frontier.is_empty() {
            push_warning(
                &mut warnings,
                TransformWarning::DepthLimitReached {
                    max_depth: MAX_DEPTH,
                    pending: frontier.len(),
                },
            );
        }

        for record in &self.records {
            let id = record.id.as_str();
            if !visited.contains(id) && !invalid.contains(id) {
                push_warning(
                    &mut warnings,
                    TransformWarning::Unreachable {
                        external_id: id.to_string(),
                    },
                );
            }
        }

        let hierarchy = DesiredHierarchy::new(layers, warnings);
        info!(
            nodes = hierarchy.len(),
            layers = hierarchy.layers().len(),
            excluded = invalid.len(),
            warnings = hierarchy.warnings().len(),
            "Hierarchy built"
        );
        Ok(hierarchy)
    }

    /// Resolve each record's effective parent and cross-check both link
    /// directions.
    ///
    /// An explicit `parent_id` wins. A record without one takes the first
    /// record that declares it as a child.
    fn resolve_links(&self, warnings: &mut Vec<TransformWarning>) -> Links<'a> {
        let mut declared_by: HashMap<&'a str, Vec<&'a str>> = HashMap::new();

        for &record in &self.records {
            let id = record.id.as_str();
            for child in record.declared_children() {
                let Some(child_record) = self.record(child) else {
                    push_warning(
                        warnings,
                        TransformWarning::MissingChild {
                            external_id: id.to_string(),
                            child_id: child.to_string(),
                        },
                    );
                    continue;
                };
                let child_id = child_record.id.as_str();
                if let Some(own_parent) = child_record.parent_ref() {
                    if own_parent != id {
                        push_warning(
                            warnings,
                            TransformWarning::UnconfirmedLink {
                                parent_id: id.to_string(),
                                child_id: child_id.to_string(),
                            },
                        );
                    }
                }
                let declarers = declared_by.entry(child_id).or_default();
                if !declarers.contains(&id) {
                    declarers.push(id);
                }
            }
        }

        let mut links = Links::default();
        for &record in &self.records {
            let id = record.id.as_str();
            match record.parent_ref() {
                Some(parent_id) => match self.record(parent_id) {
                    Some(parent) => {
                        if parent.children_ids.is_some()
                            && !parent.declared_children().any(|c| c == id)
                        {
                            push_warning(
                                warnings,
                                TransformWarning::UnconfirmedLink {
                                    parent_id: parent.id.clone(),
                                    child_id: id.to_string(),
                                },
                            );
                        }
                        links.set_parent(id, parent.id.as_str());
                    }
                    None => {
                        push_warning(
                            warnings,
                            TransformWarning::MissingParent {
                                external_id: id.to_string(),
                                parent_id: parent_id.to_string(),
                            },
                        );
                        links.dangling.push(id);
                    }
                },
                None => {
                    if let Some(declarers) = declared_by.get(id) {
                        if declarers.len() > 1 {
                            push_warning(
                                warnings,
                                TransformWarning::AmbiguousParent {
                                    external_id: id.to_string(),
                                    declared_by: declarers.iter().map(|d| (*d).to_string()).collect(),
                                },
                            );
                        }
                        links.set_parent(id, declarers[0]);
                    }
                }
            }
        }
        links
    }

    /// Mark every record below a dangling parent as invalid.
    fn exclude_dangling_subtrees(
        &self,
        links: &Links<'a>,
        warnings: &mut Vec<TransformWarning>,
    ) -> HashSet<&'a str> {
        let mut invalid: HashSet<&'a str> = links.dangling.iter().copied().collect();

        for &ancestor in &links.dangling {
            let mut stack: Vec<&str> = links.children.get(ancestor).cloned().unwrap_or_default();
            while let Some(id) = stack.pop() {
                if !invalid.insert(id) {
                    continue;
                }
                push_warning(
                    warnings,
                    TransformWarning::ExcludedDescendant {
                        external_id: id.to_string(),
                        ancestor_id: ancestor.to_string(),
                    },
                );
                stack.extend(links.children.get(id).into_iter().flatten().copied());
            }
        }

        invalid
    }
}

/// Effective parent/child adjacency.
#[derive(Debug, Default)]
struct Links<'a> {
    parent_of: HashMap<&'a str, &'a str>,
    children: HashMap<&'a str, Vec<&'a str>>,
    dangling: Vec<&'a str>,
}

impl<'a> Links<'a> {
    fn set_parent(&mut self, child: &'a str, parent: &'a str) {
        self.parent_of.insert(child, parent);
        self.children.entry(parent).or_default().push(child);
    }
}

fn push_warning(warnings: &mut Vec<TransformWarning>, warning: TransformWarning) {
    warn!(%warning, "Hierarchy warning");
    warnings.push(warning);
}
