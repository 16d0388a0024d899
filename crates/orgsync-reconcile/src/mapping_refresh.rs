//! Mapping table refresh from the observed catalog snapshot.

use orgsync_client::wire::COLLECTION_TYPE;
use orgsync_core::ObservedSnapshot;
use orgsync_mapping::MappingStore;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// Which entries a refresh may touch.
#[derive(Debug, Clone, Copy)]
pub enum RefreshScope<'a> {
    /// Every observed unit; entries without an observed unit are pruned.
    All,
    /// Only these external ids; nothing is pruned.
    Only(&'a HashSet<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingRefreshStats {
    pub added: usize,
    pub updated: usize,
    /// Subset of `updated` whose parent path changed.
    pub moved: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Bring the mapping table in line with the observed snapshot.
pub fn refresh_mapping(
    store: &mut MappingStore,
    snapshot: &ObservedSnapshot,
    scope: RefreshScope<'_>,
) -> MappingRefreshStats {
    let mut stats = MappingRefreshStats::default();

    for node in snapshot.iter() {
        if let RefreshScope::Only(ids) = scope {
            if !ids.contains(&node.external_id) {
                continue;
            }
        }

        let (is_new, is_move) = match store.get(&node.external_id) {
            Some(entry)
                if entry.internal_id == node.internal_id
                    && entry.parent_business_key == node.business_key_path =>
            {
                stats.unchanged += 1;
                continue;
            }
            Some(entry) => (false, entry.parent_business_key != node.business_key_path),
            None => (true, false),
        };

        if is_move {
            info!(
                external_id = %node.external_id,
                new_path = ?node.business_key_path,
                "Unit moved in catalog"
            );
        }

        let internal_id = node.internal_id.to_string();
        match store.put(
            &node.external_id,
            COLLECTION_TYPE,
            &internal_id,
            node.business_key_path.as_deref(),
        ) {
            Ok(()) if is_new => stats.added += 1,
            Ok(()) => {
                stats.updated += 1;
                if is_move {
                    stats.moved += 1;
                }
            }
            Err(e) => {
                warn!(external_id = %node.external_id, error = %e, "Could not update mapping entry");
                stats.failed += 1;
            }
        }
    }

    if matches!(scope, RefreshScope::All) {
        let stale: Vec<String> = store
            .all()
            .keys()
            .filter(|id| !snapshot.contains(id))
            .cloned()
            .collect();
        for external_id in stale {
            match store.remove(&external_id) {
                Ok(_) => stats.removed += 1,
                Err(e) => {
                    warn!(external_id = %external_id, error = %e, "Could not prune mapping entry");
                    stats.failed += 1;
                }
            }
        }
    }

    info!(
        added = stats.added,
        updated = stats.updated,
        removed = stats.removed,
        failed = stats.failed,
        "Refreshed mapping table"
    );
    stats
}
