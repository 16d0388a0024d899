mod helpers;

use helpers::{mapping_store, unit_url, FakeCatalog, SCHEME};
use orgsync_core::business_key::path_depth;
use orgsync_core::{
    Change, ChangedField, DeleteChange, DesiredNode, FieldDiff, FieldDiffs, InternalId,
    UpdateChange, EXTERNAL_ID_PROPERTY, EXTERNAL_URL_PROPERTY,
};
use orgsync_reconcile::ChangeApplier;
use std::collections::BTreeMap;
use tempfile::TempDir;
use uuid::Uuid;

fn desired(id: &str, label: &str, path: Option<&str>, parent: Option<&str>) -> DesiredNode {
    let mut properties = BTreeMap::new();
    properties.insert(EXTERNAL_ID_PROPERTY.to_string(), id.to_string());
    properties.insert(EXTERNAL_URL_PROPERTY.to_string(), unit_url(id));
    DesiredNode {
        external_id: id.to_string(),
        label: label.to_string(),
        depth: path_depth(path),
        business_key_path: path.map(str::to_string),
        parent_external_id: parent.map(str::to_string),
        properties,
    }
}

fn update(internal_id: InternalId, node: DesiredNode, field: ChangedField, old: &str) -> Change {
    let new = match field {
        ChangedField::Label => Some(node.label.clone()),
        ChangedField::ParentPath => node.business_key_path.clone(),
        ChangedField::ExternalUrl => node.external_url().map(str::to_string),
    };
    let mut field_diffs = FieldDiffs::new();
    field_diffs.insert(
        field,
        FieldDiff {
            old: Some(old.to_string()),
            new,
        },
    );
    Change::Update(UpdateChange {
        external_id: node.external_id.clone(),
        internal_id,
        desired: node,
        field_diffs,
    })
}

#[tokio::test]
async fn test_update_skipped_when_catalog_already_matches() {
    let dir = TempDir::new().unwrap();
    let mut mapping = mapping_store(&dir);
    let catalog = FakeCatalog::new();
    let id = catalog.seed("1", "Kanton Basel-Stadt", None);

    let change = update(
        id,
        desired("1", "Kanton Basel-Stadt", None, None),
        ChangedField::Label,
        "Kanton",
    );
    let stats = ChangeApplier::new(&catalog, &mut mapping, SCHEME)
        .apply(vec![change])
        .await;

    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.updated, 0);
    assert!(!catalog.calls().iter().any(|c| c.starts_with("update:")));
}

#[tokio::test]
async fn test_update_of_vanished_entity_counts_as_error() {
    let dir = TempDir::new().unwrap();
    let mut mapping = mapping_store(&dir);
    let catalog = FakeCatalog::new();
    let ghost = InternalId::from_uuid(Uuid::new_v4());

    let change = update(ghost, desired("1", "Kanton", None, None), ChangedField::Label, "Alt");
    let stats = ChangeApplier::new(&catalog, &mut mapping, SCHEME)
        .apply(vec![change])
        .await;

    assert_eq!(stats.errors, 1);
    assert!(stats.failures[0].message.contains("no longer exists"));
}

#[tokio::test]
async fn test_move_target_falls_back_to_path_lookup() {
    let dir = TempDir::new().unwrap();
    let mut mapping = mapping_store(&dir);
    let catalog = FakeCatalog::new();
    catalog.seed("1", "Kanton", None);
    catalog.seed("2", "Präsidialdepartement", Some("1"));
    let unit = catalog.seed("3", "Staatsarchiv", Some("1"));
    assert!(mapping.is_empty());

    let change = update(
        unit,
        desired(
            "3",
            "Staatsarchiv",
            Some("Kanton/Präsidialdepartement"),
            Some("2"),
        ),
        ChangedField::ParentPath,
        "Kanton",
    );
    let stats = ChangeApplier::new(&catalog, &mut mapping, SCHEME)
        .apply(vec![change])
        .await;

    assert_eq!(stats.updated, 1, "{:?}", stats.failures);
    assert_eq!(
        catalog.parent_path("3").as_deref(),
        Some("Kanton/Präsidialdepartement")
    );
    assert_eq!(
        mapping.get("3").unwrap().parent_business_key.as_deref(),
        Some("Kanton/Präsidialdepartement")
    );
}

#[tokio::test]
async fn test_missing_move_target_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut mapping = mapping_store(&dir);
    let catalog = FakeCatalog::new();
    catalog.seed("1", "Kanton", None);
    let unit = catalog.seed("3", "Staatsarchiv", Some("1"));

    let change = update(
        unit,
        desired("3", "Staatsarchiv", Some("Kanton/Neu"), Some("9")),
        ChangedField::ParentPath,
        "Kanton",
    );
    let stats = ChangeApplier::new(&catalog, &mut mapping, SCHEME)
        .apply(vec![change])
        .await;

    assert_eq!(stats.errors, 1);
    assert!(stats.failures[0].message.contains("'Kanton/Neu'"));
    assert_eq!(catalog.parent_path("3").as_deref(), Some("Kanton"));
}

#[tokio::test]
async fn test_deletes_run_deepest_first_and_tolerate_missing_entities() {
    let dir = TempDir::new().unwrap();
    let mut mapping = mapping_store(&dir);
    let catalog = FakeCatalog::new();
    let root = catalog.seed("1", "Kanton", None);
    let child = catalog.seed("2", "Departement", Some("1"));

    let delete = |external_id: &str, internal_id, path: Option<&str>| {
        Change::Delete(DeleteChange {
            external_id: external_id.to_string(),
            internal_id,
            label: external_id.to_string(),
            last_known_path: path.map(str::to_string),
        })
    };
    let stats = ChangeApplier::new(&catalog, &mut mapping, SCHEME)
        .apply(vec![
            delete("1", root, None),
            delete("2", child, Some("Kanton")),
            delete("9", InternalId::from_uuid(Uuid::new_v4()), Some("Kanton")),
        ])
        .await;

    assert_eq!(stats.deleted, 2);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(catalog.calls(), vec!["delete:2", "delete:1"]);
    assert_eq!(catalog.len(), 0);
}

#[tokio::test]
async fn test_creates_are_batched_per_parent() {
    let dir = TempDir::new().unwrap();
    let mut mapping = mapping_store(&dir);
    let catalog = FakeCatalog::new();
    catalog.seed("1", "Kanton", None);
    catalog.seed("2", "Departement", Some("1"));

    let stats = ChangeApplier::new(&catalog, &mut mapping, SCHEME)
        .apply(vec![
            Change::Create(desired("3", "Amt A", Some("Kanton"), Some("1"))),
            Change::Create(desired("4", "Abteilung", Some("Kanton/Departement"), Some("2"))),
            Change::Create(desired("5", "Amt B", Some("Kanton"), Some("1"))),
        ])
        .await;

    assert_eq!(stats.created, 3);
    assert_eq!(catalog.calls(), vec!["upload:2", "upload:1"]);
    assert!(stats.touched.contains("4"));
}
