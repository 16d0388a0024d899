//! Conversion between catalog wire entities and typed nodes.

use orgsync_client::wire::{CatalogEntity, EntityPayload, COLLECTION_TYPE, ORG_UNIT_STEREOTYPE};
use orgsync_core::{
    DesiredNode, HierarchyResult, InternalId, ObservedNode, ObservedSnapshot, EXTERNAL_ID_PROPERTY,
    EXTERNAL_URL_PROPERTY,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// An org-unit entity that could not be turned into an [`ObservedNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRejection {
    pub external_id: String,
    pub label: Option<String>,
    pub reason: String,
}

/// Whether a downloaded entity is an organisational unit managed here.
#[must_use]
pub fn is_managed_unit(entity: &CatalogEntity) -> bool {
    entity.is_type(COLLECTION_TYPE)
        && entity.has_stereotype(ORG_UNIT_STEREOTYPE)
        && entity.property(EXTERNAL_ID_PROPERTY).is_some()
}

/// Build an observed node from any catalog entity carrying an external id.
pub fn observed_node(entity: &CatalogEntity) -> Result<ObservedNode, SnapshotRejection> {
    let external_id = entity
        .property(EXTERNAL_ID_PROPERTY)
        .ok_or_else(|| SnapshotRejection {
            external_id: String::new(),
            label: entity.label.clone(),
            reason: format!("missing {EXTERNAL_ID_PROPERTY}"),
        })?;

    let raw_id = entity.id.as_deref().unwrap_or_default();
    let internal_id = InternalId::parse(raw_id).map_err(|e| SnapshotRejection {
        external_id: external_id.clone(),
        label: entity.label.clone(),
        reason: e.to_string(),
    })?;

    let mut properties = BTreeMap::new();
    properties.insert(EXTERNAL_ID_PROPERTY.to_string(), external_id.clone());
    if let Some(url) = entity.property(EXTERNAL_URL_PROPERTY) {
        properties.insert(EXTERNAL_URL_PROPERTY.to_string(), url);
    }

    Ok(ObservedNode {
        internal_id,
        external_id,
        label: entity.label.clone().unwrap_or_default(),
        business_key_path: entity.in_collection.clone().filter(|p| !p.is_empty()),
        properties,
    })
}

/// Managed org units of one scheme download.
#[derive(Debug)]
pub struct CatalogSnapshot {
    /// Units indexed by external id.
    pub observed: ObservedSnapshot,
    /// Units present in the catalog but unusable for comparison.
    pub rejected: Vec<SnapshotRejection>,
    /// Managed units downloaded, accepted or not.
    pub managed: usize,
}

impl CatalogSnapshot {
    /// True when the catalog holds no managed unit at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managed == 0
    }

    /// External ids of rejected units. These exist in the catalog and must
    /// never be created again.
    #[must_use]
    pub fn rejected_ids(&self) -> HashSet<&str> {
        self.rejected
            .iter()
            .map(|r| r.external_id.as_str())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

/// Filter a scheme download to managed org units and index them.
///
/// Units with an unusable internal id are returned as rejections. A repeated
/// external id fails the whole snapshot.
pub fn build_snapshot(entities: &[CatalogEntity]) -> HierarchyResult<CatalogSnapshot> {
    let mut nodes = Vec::new();
    let mut rejected = Vec::new();
    let mut managed = 0;

    for entity in entities.iter().filter(|e| is_managed_unit(e)) {
        managed += 1;
        match observed_node(entity) {
            Ok(node) => nodes.push(node),
            Err(rejection) => {
                warn!(
                    external_id = %rejection.external_id,
                    reason = %rejection.reason,
                    "Ignoring catalog unit"
                );
                rejected.push(rejection);
            }
        }
    }

    debug!(
        downloaded = entities.len(),
        units = nodes.len(),
        rejected = rejected.len(),
        "Built observed snapshot"
    );
    Ok(CatalogSnapshot {
        observed: ObservedSnapshot::from_nodes(nodes)?,
        rejected,
        managed,
    })
}

/// Upload payload for a node that does not exist yet.
#[must_use]
pub fn create_payload(node: &DesiredNode) -> EntityPayload {
    let mut payload = EntityPayload::org_unit();
    payload.label = Some(node.label.clone());
    payload.in_collection = node.business_key_path.clone();
    payload.custom_properties = node.properties.clone();
    payload
}
