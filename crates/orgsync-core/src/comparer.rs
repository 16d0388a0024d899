//! Desired versus observed structure comparison.

use crate::change::{Change, ChangedField, DeleteChange, FieldDiff, FieldDiffs, UpdateChange};
use crate::node::{DesiredHierarchy, DesiredNode, ObservedNode, ObservedSnapshot};
use std::collections::HashSet;
use tracing::{debug, info};

/// Produces the change-set that turns the observed catalog into the
/// desired hierarchy.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureComparer;

impl StructureComparer {
    /// Compare and return creates and updates in desired layer order,
    /// followed by deletes in catalog order.
    #[must_use]
    pub fn compare(desired: &DesiredHierarchy, observed: &ObservedSnapshot) -> Vec<Change> {
        let mut changes = Vec::new();
        let mut seen: HashSet<&str> = HashSet::with_capacity(desired.len());
        let (mut creates, mut updates, mut deletes) = (0usize, 0usize, 0usize);

        for node in desired.iter() {
            seen.insert(node.external_id.as_str());
            match observed.get(&node.external_id) {
                Some(current) => {
                    let field_diffs = Self::diff_node(node, current);
                    if field_diffs.is_empty() {
                        continue;
                    }
                    debug!(
                        external_id = %node.external_id,
                        fields = ?field_diffs.keys().collect::<Vec<_>>(),
                        "Unit differs from catalog"
                    );
                    updates += 1;
                    changes.push(Change::Update(UpdateChange {
                        external_id: node.external_id.clone(),
                        internal_id: current.internal_id,
                        desired: node.clone(),
                        field_diffs,
                    }));
                }
                None => {
                    creates += 1;
                    changes.push(Change::Create(node.clone()));
                }
            }
        }

        for current in observed.iter() {
            if seen.contains(current.external_id.as_str()) {
                continue;
            }
            deletes += 1;
            changes.push(Change::Delete(DeleteChange {
                external_id: current.external_id.clone(),
                internal_id: current.internal_id,
                label: current.label.clone(),
                last_known_path: current.business_key_path.clone(),
            }));
        }

        info!(
            desired = desired.len(),
            observed = observed.len(),
            creates,
            updates,
            deletes,
            "Compared desired structure with catalog"
        );
        changes
    }

    /// Field-level differences between one desired and one observed node.
    ///
    /// Paths are compared as escaped strings without normalisation. An
    /// absent value and an empty string are treated as equal.
    #[must_use]
    pub fn diff_node(desired: &DesiredNode, observed: &ObservedNode) -> FieldDiffs {
        let mut diffs = FieldDiffs::new();

        if desired.label != observed.label {
            diffs.insert(
                ChangedField::Label,
                FieldDiff {
                    old: Some(observed.label.clone()),
                    new: Some(desired.label.clone()),
                },
            );
        }

        push_if_changed(
            &mut diffs,
            ChangedField::ExternalUrl,
            observed.external_url(),
            desired.external_url(),
        );
        push_if_changed(
            &mut diffs,
            ChangedField::ParentPath,
            observed.business_key_path.as_deref(),
            desired.business_key_path.as_deref(),
        );

        diffs
    }
}

fn push_if_changed(diffs: &mut FieldDiffs, field: ChangedField, old: Option<&str>, new: Option<&str>) {
    let old = old.filter(|v| !v.is_empty());
    let new = new.filter(|v| !v.is_empty());
    if old != new {
        diffs.insert(
            field,
            FieldDiff {
                old: old.map(str::to_string),
                new: new.map(str::to_string),
            },
        );
    }
}
