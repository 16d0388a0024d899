//! Change application against the catalog.
//!
//! Changes run in three phases: deletions (deepest first), updates (renames
//! before other edits, shallow targets first), then creations batched per
//! parent path. A failing entity is counted and the run moves on.

use crate::error::{ReconcileError, ReconcileResult};
use crate::snapshot::{create_payload, observed_node};
use orgsync_client::wire::{
    CatalogEntity, EntityPayload, EntityRef, UpdateMode, UploadMessage, UploadMode, COLLECTION_TYPE,
};
use orgsync_client::{CatalogClient, ClientError};
use orgsync_core::business_key::path_depth;
use orgsync_core::{
    Change, ChangedField, DeleteChange, DesiredNode, FieldDiffs, InternalId, StructureComparer,
    UpdateChange, EXTERNAL_ID_PROPERTY, EXTERNAL_URL_PROPERTY,
};
use orgsync_mapping::MappingStore;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// One entity the applier could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyFailure {
    pub operation: &'static str,
    pub external_id: String,
    pub label: String,
    pub message: String,
}

/// Outcome counters of an apply pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Changes dropped because the catalog already matched them.
    pub unchanged: usize,
    pub errors: usize,
    pub failures: Vec<ApplyFailure>,
    /// External ids created or updated, for the post-run mapping refresh.
    #[serde(skip)]
    pub touched: HashSet<String>,
}

impl ApplyStats {
    /// Number of entities changed in the catalog.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn fail(
        &mut self,
        operation: &'static str,
        external_id: &str,
        label: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(operation, external_id, label, error = %message, "Change failed");
        self.errors += 1;
        self.failures.push(ApplyFailure {
            operation,
            external_id: external_id.to_string(),
            label: label.to_string(),
            message,
        });
    }
}

enum UpdateOutcome {
    Applied,
    Unchanged,
}

/// Applies a change-set through a [`CatalogClient`], keeping the mapping
/// table in step with every successful write.
pub struct ChangeApplier<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    mapping: &'a mut MappingStore,
    scheme: &'a str,
}

impl<'a, C: CatalogClient + ?Sized> ChangeApplier<'a, C> {
    pub fn new(client: &'a C, mapping: &'a mut MappingStore, scheme: &'a str) -> Self {
        Self {
            client,
            mapping,
            scheme,
        }
    }

    /// Apply `changes` in dependency-safe order.
    pub async fn apply(&mut self, changes: Vec<Change>) -> ApplyStats {
        let mut stats = ApplyStats::default();
        if changes.is_empty() {
            info!("No changes to apply");
            return stats;
        }
        info!(changes = changes.len(), "Applying changes");

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for change in changes {
            match change {
                Change::Create(node) => creates.push(node),
                Change::Update(update) => updates.push(update),
                Change::Delete(delete) => deletes.push(delete),
            }
        }

        self.apply_deletes(deletes, &mut stats).await;
        self.apply_updates(updates, &mut stats).await;
        self.apply_creates(creates, &mut stats).await;

        info!(
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            unchanged = stats.unchanged,
            errors = stats.errors,
            "Change application complete"
        );
        stats
    }

    /// Upload a whole hierarchy into an empty catalog, one batch per layer.
    ///
    /// Rejected entities are counted; a transport error stops the load and is
    /// returned with `stats` holding what was uploaded so far.
    pub async fn load_layers(
        &mut self,
        layers: &[Vec<DesiredNode>],
        stats: &mut ApplyStats,
    ) -> ReconcileResult<()> {
        for (depth, layer) in layers.iter().enumerate() {
            if layer.is_empty() {
                continue;
            }
            info!(depth, units = layer.len(), "Uploading layer");
            let payloads: Vec<EntityPayload> = layer.iter().map(create_payload).collect();
            let messages = self
                .client
                .bulk_upload(self.scheme, &payloads, UploadMode::Add, false)
                .await?;
            record_upload(layer, &messages, stats);
        }
        Ok(())
    }

    // ── Deletions ─────────────────────────────────────────────────────

    async fn apply_deletes(&mut self, mut deletes: Vec<DeleteChange>, stats: &mut ApplyStats) {
        // Children before parents, so no delete relies on a cascade.
        deletes.sort_by_key(|d| Reverse(path_depth(d.last_known_path.as_deref())));

        for delete in deletes {
            debug!(external_id = %delete.external_id, label = %delete.label, "Deleting unit");
            match self.client.delete(&EntityRef::Id(delete.internal_id)).await {
                Ok(()) => stats.deleted += 1,
                Err(ClientError::NotFound(_)) => {
                    debug!(external_id = %delete.external_id, "Unit already absent");
                    stats.unchanged += 1;
                }
                Err(e) => {
                    stats.fail("delete", &delete.external_id, &delete.label, e.to_string());
                    continue;
                }
            }
            if let Err(e) = self.mapping.remove(&delete.external_id) {
                warn!(external_id = %delete.external_id, error = %e, "Could not remove mapping entry");
            }
        }
    }

    // ── Updates ───────────────────────────────────────────────────────

    async fn apply_updates(&mut self, updates: Vec<UpdateChange>, stats: &mut ApplyStats) {
        let (renames, others): (Vec<_>, Vec<_>) =
            updates.into_iter().partition(UpdateChange::is_label_only);

        for mut phase in [renames, others] {
            phase.sort_by_key(|u| u.desired.parent_depth());
            for update in phase {
                match self.apply_update(&update).await {
                    Ok(UpdateOutcome::Applied) => {
                        stats.updated += 1;
                        stats.touched.insert(update.external_id.clone());
                    }
                    Ok(UpdateOutcome::Unchanged) => stats.unchanged += 1,
                    Err(e) => stats.fail(
                        "update",
                        &update.external_id,
                        &update.desired.label,
                        e.to_string(),
                    ),
                }
            }
        }
    }

    async fn apply_update(&mut self, update: &UpdateChange) -> ReconcileResult<UpdateOutcome> {
        let entity_ref = EntityRef::Id(update.internal_id);
        let current = self.client.get_entity(&entity_ref).await?.ok_or_else(|| {
            ReconcileError::EntityVanished {
                external_id: update.external_id.clone(),
                internal_id: update.internal_id,
            }
        })?;

        let mut diffs = self.current_diffs(update, &current);
        let mut move_to = None;
        if diffs.contains_key(&ChangedField::ParentPath) {
            let parent = self.resolve_move_target(update).await?;
            if parent_id(&current) == Some(parent) {
                // Only an ancestor's label changed; the path follows it.
                debug!(external_id = %update.external_id, "Parent path follows renamed ancestor");
                diffs.remove(&ChangedField::ParentPath);
                self.record_mapping(update);
            } else {
                move_to = Some(parent);
            }
        }
        if diffs.is_empty() {
            debug!(external_id = %update.external_id, "Unit already up to date");
            return Ok(UpdateOutcome::Unchanged);
        }

        let mut payload = EntityPayload::org_unit();
        payload
            .custom_properties
            .insert(EXTERNAL_ID_PROPERTY.to_string(), update.external_id.clone());
        if diffs.contains_key(&ChangedField::Label) {
            payload.label = Some(update.desired.label.clone());
        }
        if diffs.contains_key(&ChangedField::ExternalUrl) {
            let url = update.desired.external_url().unwrap_or_default();
            payload
                .custom_properties
                .insert(EXTERNAL_URL_PROPERTY.to_string(), url.to_string());
        }
        if let Some(parent) = move_to {
            info!(
                external_id = %update.external_id,
                target = ?update.desired.business_key_path,
                parent = %parent,
                "Moving unit"
            );
            payload.in_collection = Some(parent.to_string());
        }

        self.client
            .update(&entity_ref, &payload, UpdateMode::Partial)
            .await?;
        debug!(
            external_id = %update.external_id,
            fields = ?diffs.keys().collect::<Vec<_>>(),
            "Updated unit"
        );

        self.record_mapping(update);
        Ok(UpdateOutcome::Applied)
    }

    fn record_mapping(&mut self, update: &UpdateChange) {
        let internal_id = update.internal_id.to_string();
        if let Err(e) = self.mapping.put(
            &update.external_id,
            COLLECTION_TYPE,
            &internal_id,
            update.desired.business_key_path.as_deref(),
        ) {
            warn!(external_id = %update.external_id, error = %e, "Could not record mapping entry");
        }
    }

    /// Diff the desired node against the freshly fetched entity.
    ///
    /// REST entities reference their parent by id, so the parent path side
    /// of the diff is taken from the comparer's view of the entity.
    fn current_diffs(
        &self,
        update: &UpdateChange,
        current: &CatalogEntity,
    ) -> FieldDiffs {
        match observed_node(current) {
            Ok(mut node) => {
                node.business_key_path = match update.field_diffs.get(&ChangedField::ParentPath) {
                    Some(diff) => diff.old.clone(),
                    None => update.desired.business_key_path.clone(),
                };
                StructureComparer::diff_node(&update.desired, &node)
            }
            Err(rejection) => {
                debug!(
                    external_id = %update.external_id,
                    reason = %rejection.reason,
                    "Re-fetched entity not comparable, keeping planned diff"
                );
                update.field_diffs.clone()
            }
        }
    }

    async fn resolve_move_target(&self, update: &UpdateChange) -> ReconcileResult<InternalId> {
        let target = match update.desired.business_key_path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => {
                return Err(ReconcileError::RootMoveUnsupported {
                    external_id: update.external_id.clone(),
                })
            }
        };

        if let Some(entry) = update
            .desired
            .parent_external_id
            .as_deref()
            .and_then(|parent| self.mapping.get(parent))
        {
            return Ok(entry.internal_id);
        }

        let not_found = || ReconcileError::MoveTargetNotFound {
            external_id: update.external_id.clone(),
            path: target.to_string(),
        };
        let parent = self
            .client
            .get_entity(&EntityRef::Path(target.to_string()))
            .await?
            .ok_or_else(not_found)?;
        parent
            .id
            .as_deref()
            .and_then(|id| InternalId::parse(id).ok())
            .ok_or_else(not_found)
    }

    // ── Creations ─────────────────────────────────────────────────────

    async fn apply_creates(&mut self, creates: Vec<DesiredNode>, stats: &mut ApplyStats) {
        for (parent_path, nodes) in group_by_parent(creates) {
            info!(
                parent = parent_path.as_deref().unwrap_or(""),
                units = nodes.len(),
                "Creating units"
            );
            let payloads: Vec<EntityPayload> = nodes.iter().map(create_payload).collect();
            match self
                .client
                .bulk_upload(self.scheme, &payloads, UploadMode::Add, false)
                .await
            {
                Ok(messages) => record_upload(&nodes, &messages, stats),
                Err(e) => {
                    let message = e.to_string();
                    for node in &nodes {
                        stats.fail("create", &node.external_id, &node.label, message.clone());
                    }
                }
            }
        }
    }
}

/// Parent of a REST entity, which references it by id.
fn parent_id(entity: &CatalogEntity) -> Option<InternalId> {
    entity
        .in_collection
        .as_deref()
        .and_then(|id| InternalId::parse(id).ok())
}

/// Group creations by parent path in first-seen order, shallow groups first.
fn group_by_parent(creates: Vec<DesiredNode>) -> Vec<(Option<String>, Vec<DesiredNode>)> {
    let mut groups: Vec<(Option<String>, Vec<DesiredNode>)> = Vec::new();
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    for node in creates {
        let key = node.business_key_path.clone();
        match index.get(&key) {
            Some(&i) => groups[i].1.push(node),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![node]));
            }
        }
    }
    groups.sort_by_key(|(path, _)| path_depth(path.as_deref()));
    groups
}

/// Count a bulk upload result. `ERROR` messages are attributed to the unit
/// whose label they mention where possible.
fn record_upload(nodes: &[DesiredNode], messages: &[UploadMessage], stats: &mut ApplyStats) {
    let mut failed: HashSet<&str> = HashSet::new();
    let mut error_count = 0;

    for message in messages.iter().filter(|m| m.is_error()) {
        error_count += 1;
        let culprit = nodes.iter().find(|n| {
            !failed.contains(n.external_id.as_str()) && message.message.contains(&n.label)
        });
        match culprit {
            Some(node) => {
                failed.insert(&node.external_id);
                stats.fail("create", &node.external_id, &node.label, message.message.clone());
            }
            None => {
                let label = nodes
                    .first()
                    .and_then(|n| n.business_key_path.clone())
                    .unwrap_or_default();
                stats.fail("create", "", &label, message.message.clone());
            }
        }
    }

    let error_count = error_count.min(nodes.len());
    stats.created += nodes.len() - error_count;
    for node in nodes {
        if !failed.contains(node.external_id.as_str()) {
            stats.touched.insert(node.external_id.clone());
        }
    }
    if error_count > 0 {
        warn!(errors = error_count, units = nodes.len(), "Upload completed with errors");
    } else {
        debug!(units = nodes.len(), "Upload completed");
    }
}
