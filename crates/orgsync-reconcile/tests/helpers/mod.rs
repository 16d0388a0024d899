//! In-memory collaborators for reconciliation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use orgsync_client::wire::{
    CatalogEntity, EntityPayload, EntityRef, UpdateMode, UploadMessage, UploadMode,
    COLLECTION_TYPE, ORG_UNIT_STEREOTYPE,
};
use orgsync_client::{CatalogClient, ClientError, ClientResult, SourceClient};
use orgsync_core::business_key::{join_path, split_path};
use orgsync_core::{ExternalRecord, InternalId, RecordPage, EXTERNAL_ID_PROPERTY, EXTERNAL_URL_PROPERTY};
use orgsync_mapping::{MappingStore, MappingTable};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

pub const SCHEME: &str = "Datennutzungskatalog";

#[derive(Debug, Clone)]
pub struct Unit {
    pub id: InternalId,
    pub external_id: String,
    pub label: String,
    pub parent: Option<InternalId>,
    pub url: Option<String>,
}

#[derive(Debug, Default)]
struct CatalogState {
    units: Vec<Unit>,
    calls: Vec<String>,
    rejected_labels: HashSet<String>,
    garbled_ids: HashSet<String>,
    offline: bool,
}

impl CatalogState {
    fn find(&self, id: InternalId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    fn path_of(&self, unit: &Unit) -> Option<String> {
        let mut labels = Vec::new();
        let mut parent = unit.parent;
        while let Some(id) = parent {
            let ancestor = self.find(id)?;
            labels.push(ancestor.label.clone());
            parent = ancestor.parent;
        }
        if labels.is_empty() {
            return None;
        }
        labels.reverse();
        Some(join_path(labels))
    }

    fn resolve_path(&self, path: &str) -> Option<InternalId> {
        let labels = split_path(path).ok()?;
        let mut parent: Option<InternalId> = None;
        for label in labels {
            parent = Some(
                self.units
                    .iter()
                    .find(|u| u.parent == parent && u.label == label)?
                    .id,
            );
        }
        parent
    }

    /// REST shape: parent referenced by id, properties nested.
    fn rest_entity(&self, unit: &Unit) -> CatalogEntity {
        let mut custom_properties = BTreeMap::new();
        custom_properties.insert(
            EXTERNAL_ID_PROPERTY.to_string(),
            Value::String(unit.external_id.clone()),
        );
        if let Some(url) = &unit.url {
            custom_properties.insert(EXTERNAL_URL_PROPERTY.to_string(), Value::String(url.clone()));
        }
        CatalogEntity {
            id: Some(unit.id.to_string()),
            entity_type: Some(COLLECTION_TYPE.to_string()),
            label: Some(unit.label.clone()),
            stereotype: Some(ORG_UNIT_STEREOTYPE.to_string()),
            in_collection: unit.parent.map(|p| p.to_string()),
            custom_properties,
            extra: BTreeMap::new(),
        }
    }

    /// Download shape: parent referenced by business key, properties flat.
    fn download_entity(&self, unit: &Unit) -> CatalogEntity {
        let mut extra = BTreeMap::new();
        extra.insert(
            EXTERNAL_ID_PROPERTY.to_string(),
            Value::String(unit.external_id.clone()),
        );
        if let Some(url) = &unit.url {
            extra.insert(EXTERNAL_URL_PROPERTY.to_string(), Value::String(url.clone()));
        }
        let id = if self.garbled_ids.contains(&unit.external_id) {
            unit.id.to_string().to_uppercase().replace('-', "")
        } else {
            unit.id.to_string()
        };
        CatalogEntity {
            id: Some(id),
            entity_type: Some(COLLECTION_TYPE.to_string()),
            label: Some(unit.label.clone()),
            stereotype: Some(ORG_UNIT_STEREOTYPE.to_string()),
            in_collection: self.path_of(unit),
            custom_properties: BTreeMap::new(),
            extra,
        }
    }

    fn check_online(&self) -> ClientResult<()> {
        if self.offline {
            return Err(ClientError::Api {
                status: 503,
                detail: "catalog unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Catalog that keeps units in memory and derives business keys from
/// parent links, as the real service does.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit below the unit with external id `parent`.
    pub fn seed(&self, external_id: &str, label: &str, parent: Option<&str>) -> InternalId {
        let mut state = self.state.lock().unwrap();
        let parent = parent.map(|p| {
            state
                .units
                .iter()
                .find(|u| u.external_id == p)
                .expect("seeded parent exists")
                .id
        });
        let id = InternalId::from_uuid(Uuid::new_v4());
        state.units.push(Unit {
            id,
            external_id: external_id.to_string(),
            label: label.to_string(),
            parent,
            url: Some(unit_url(external_id)),
        });
        id
    }

    pub fn reject_label(&self, label: &str) {
        self.state.lock().unwrap().rejected_labels.insert(label.to_string());
    }

    /// Serve an unparseable internal id for this unit in scheme downloads.
    pub fn garble_download_id(&self, external_id: &str) {
        self.state
            .lock()
            .unwrap()
            .garbled_ids
            .insert(external_id.to_string());
    }

    /// Number of units carrying this external id.
    pub fn count(&self, external_id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.units.iter().filter(|u| u.external_id == external_id).count()
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn unit(&self, external_id: &str) -> Option<Unit> {
        let state = self.state.lock().unwrap();
        state.units.iter().find(|u| u.external_id == external_id).cloned()
    }

    /// Business-key path of a unit's parent.
    pub fn parent_path(&self, external_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let unit = state.units.iter().find(|u| u.external_id == external_id)?;
        state.path_of(unit)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().units.len()
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn get_entity(&self, entity: &EntityRef) -> ClientResult<Option<CatalogEntity>> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        state.calls.push(format!("get:{entity}"));
        let id = match entity {
            EntityRef::Id(id) => Some(*id),
            EntityRef::Path(path) => state.resolve_path(path),
        };
        Ok(id
            .and_then(|id| state.find(id))
            .map(|unit| state.rest_entity(unit)))
    }

    async fn create(
        &self,
        parent: Option<&EntityRef>,
        payload: &EntityPayload,
    ) -> ClientResult<CatalogEntity> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        let parent = match parent {
            Some(EntityRef::Id(id)) => Some(*id),
            Some(EntityRef::Path(path)) => Some(
                state
                    .resolve_path(path)
                    .ok_or_else(|| ClientError::NotFound(path.clone()))?,
            ),
            None => None,
        };
        let unit = Unit {
            id: InternalId::from_uuid(Uuid::new_v4()),
            external_id: payload
                .custom_properties
                .get(EXTERNAL_ID_PROPERTY)
                .cloned()
                .unwrap_or_default(),
            label: payload.label.clone().unwrap_or_default(),
            parent,
            url: payload.custom_properties.get(EXTERNAL_URL_PROPERTY).cloned(),
        };
        state.calls.push(format!("create:{}", unit.external_id));
        let entity = state.rest_entity(&unit);
        state.units.push(unit);
        Ok(entity)
    }

    async fn update(
        &self,
        entity: &EntityRef,
        payload: &EntityPayload,
        _mode: UpdateMode,
    ) -> ClientResult<CatalogEntity> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        let EntityRef::Id(id) = entity else {
            return Err(ClientError::InvalidPath("updates go by id".into()));
        };
        let parent = match payload.in_collection.as_deref() {
            Some(raw) => Some(Some(
                InternalId::parse(raw).map_err(|e| ClientError::Parse(e.to_string()))?,
            )),
            None => None,
        };
        let unit = state
            .units
            .iter_mut()
            .find(|u| u.id == *id)
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        if let Some(label) = &payload.label {
            unit.label = label.clone();
        }
        if let Some(parent) = parent {
            unit.parent = parent;
        }
        if let Some(url) = payload.custom_properties.get(EXTERNAL_URL_PROPERTY) {
            unit.url = Some(url.clone()).filter(|u| !u.is_empty());
        }
        let unit = unit.clone();
        state.calls.push(format!("update:{}", unit.external_id));
        Ok(state.rest_entity(&unit))
    }

    async fn delete(&self, entity: &EntityRef) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        let EntityRef::Id(id) = entity else {
            return Err(ClientError::InvalidPath("deletes go by id".into()));
        };
        let Some(unit) = state.find(*id).cloned() else {
            return Err(ClientError::NotFound(id.to_string()));
        };
        state.calls.push(format!("delete:{}", unit.external_id));

        // Cascade to descendants.
        let mut doomed: HashSet<InternalId> = [*id].into_iter().collect();
        loop {
            let before = doomed.len();
            for u in &state.units {
                if u.parent.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(u.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        state.units.retain(|u| !doomed.contains(&u.id));
        Ok(())
    }

    async fn bulk_upload(
        &self,
        _scheme: &str,
        payloads: &[EntityPayload],
        _mode: UploadMode,
        dry_run: bool,
    ) -> ClientResult<Vec<UploadMessage>> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        state.calls.push(format!("upload:{}", payloads.len()));
        let mut messages = Vec::new();
        let mut accepted = 0;

        for payload in payloads {
            let label = payload.label.clone().unwrap_or_default();
            if state.rejected_labels.contains(&label) {
                messages.push(error(format!("Collection '{label}' rejected by validation")));
                continue;
            }
            let parent = match payload.in_collection.as_deref() {
                Some(path) => match state.resolve_path(path) {
                    Some(id) => Some(id),
                    None => {
                        messages.push(error(format!("Parent '{path}' of '{label}' not found")));
                        continue;
                    }
                },
                None => None,
            };
            accepted += 1;
            if dry_run {
                continue;
            }
            state.units.push(Unit {
                id: InternalId::from_uuid(Uuid::new_v4()),
                external_id: payload
                    .custom_properties
                    .get(EXTERNAL_ID_PROPERTY)
                    .cloned()
                    .unwrap_or_default(),
                label,
                parent,
                url: payload.custom_properties.get(EXTERNAL_URL_PROPERTY).cloned(),
            });
        }

        messages.push(UploadMessage {
            level: "INFO".to_string(),
            message: format!("{accepted} entities processed"),
        });
        Ok(messages)
    }

    async fn download_all(&self, _scheme: &str) -> ClientResult<Vec<CatalogEntity>> {
        let mut state = self.state.lock().unwrap();
        state.check_online()?;
        state.calls.push("download".to_string());
        Ok(state
            .units
            .iter()
            .map(|unit| state.download_entity(unit))
            .collect())
    }
}

fn error(message: String) -> UploadMessage {
    UploadMessage {
        level: "ERROR".to_string(),
        message,
    }
}

pub fn unit_url(external_id: &str) -> String {
    format!("https://staatskalender.bs.ch/organization/{external_id}")
}

/// Paged source over a fixed record list.
#[derive(Debug, Default)]
pub struct FakeSource {
    records: Mutex<Vec<ExternalRecord>>,
}

impl FakeSource {
    pub fn new(records: Vec<ExternalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn replace(&self, records: Vec<ExternalRecord>) {
        *self.records.lock().unwrap() = records;
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_records(&self, page_size: usize, offset: usize) -> ClientResult<RecordPage> {
        let records = self.records.lock().unwrap();
        Ok(RecordPage {
            results: records.iter().skip(offset).take(page_size).cloned().collect(),
            total_count: records.len() as u64,
        })
    }
}

/// Record with the URL the fake catalog seeds units with.
pub fn record(id: &str, title: &str, parent: Option<&str>) -> ExternalRecord {
    ExternalRecord::new(id, title, parent).with_url(&unit_url(id))
}

/// Canton-style sample tree:
///
/// ```text
/// Kanton (1)
/// ├── Finanzdepartement (2)
/// │   └── Steuerverwaltung (4)
/// └── Bau- und Verkehrsdepartement (3)
///     └── Amt für Mobilität (5)
/// ```
pub fn canton_records() -> Vec<ExternalRecord> {
    vec![
        record("1", "Kanton", None),
        record("2", "Finanzdepartement", Some("1")),
        record("3", "Bau- und Verkehrsdepartement", Some("1")),
        record("4", "Steuerverwaltung", Some("2")),
        record("5", "Amt für Mobilität", Some("3")),
    ]
}

pub fn mapping_store(dir: &TempDir) -> MappingStore {
    MappingStore::open(dir.path(), MappingTable::ORG_UNITS, "prod", "DNK")
}
