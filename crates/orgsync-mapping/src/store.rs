//! CSV-backed mapping store.

use crate::error::{MappingError, MappingResult};
use orgsync_core::InternalId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const KIND_HEADER: &str = "_type";
const UUID_HEADER: &str = "uuid";
const PARENT_HEADER: &str = "inCollection";

/// Which mapping table a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingTable {
    /// Header of the external id column.
    pub id_field_name: &'static str,
    /// File name prefix.
    pub file_prefix: &'static str,
}

impl MappingTable {
    /// Organisational units keyed by Staatskalender id.
    pub const ORG_UNITS: Self = Self {
        id_field_name: "staatskalender_id",
        file_prefix: "staatskalender-dataspot",
    };

    /// Datasets keyed by ODS id.
    pub const DATASETS: Self = Self {
        id_field_name: "ods_id",
        file_prefix: "ods-dataspot",
    };

    /// `{database}_{scheme}_{prefix}-mapping.csv`
    #[must_use]
    pub fn file_name(&self, database: &str, scheme: &str) -> String {
        format!("{database}_{scheme}_{}-mapping.csv", self.file_prefix)
    }

    #[must_use]
    pub fn headers(&self) -> [&'static str; 4] {
        [self.id_field_name, KIND_HEADER, UUID_HEADER, PARENT_HEADER]
    }
}

/// Catalog-side location of one external entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    /// Catalog entity kind, e.g. `Collection`.
    pub kind: String,
    pub internal_id: InternalId,
    /// Business key of the parent collection.
    pub parent_business_key: Option<String>,
}

/// File-backed table of `external_id -> MappingEntry`.
///
/// Every successful mutation rewrites the whole file, sorted by external id,
/// through a temporary file that is renamed into place. The store is not
/// safe for use by several processes at once.
#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    table: MappingTable,
    entries: BTreeMap<String, MappingEntry>,
}

impl MappingStore {
    /// Open the table for a database/scheme pair inside `dir`.
    pub fn open(dir: impl AsRef<Path>, table: MappingTable, database: &str, scheme: &str) -> Self {
        Self::open_path(dir.as_ref().join(table.file_name(database, scheme)), table)
    }

    /// Open the table at an explicit path. Never fails; problems are logged
    /// and leave an empty table.
    pub fn open_path(path: impl Into<PathBuf>, table: MappingTable) -> Self {
        let path = path.into();
        let entries = load_entries(&path, &table);
        info!(path = %path.display(), entries = entries.len(), "Loaded mapping table");
        Self {
            path,
            table,
            entries,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn table(&self) -> MappingTable {
        self.table
    }

    /// Look up an entry. Keys are trimmed as on [`MappingStore::put`].
    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<&MappingEntry> {
        self.entries.get(external_id.trim())
    }

    /// All entries, sorted by external id.
    #[must_use]
    pub fn all(&self) -> &BTreeMap<String, MappingEntry> {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry and persist.
    ///
    /// Empty fields and non-canonical internal ids are rejected without
    /// touching the table. Writing an identical entry is a no-op.
    pub fn put(
        &mut self,
        external_id: &str,
        kind: &str,
        internal_id: &str,
        parent_business_key: Option<&str>,
    ) -> MappingResult<()> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(MappingError::EmptyField("external_id"));
        }
        if kind.trim().is_empty() {
            return Err(MappingError::EmptyField("kind"));
        }
        if internal_id.trim().is_empty() {
            return Err(MappingError::EmptyField("internal_id"));
        }
        let internal_id = InternalId::parse(internal_id)
            .map_err(|_| MappingError::InvalidInternalId(internal_id.to_string()))?;

        let entry = MappingEntry {
            kind: kind.trim().to_string(),
            internal_id,
            parent_business_key: parent_business_key
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        };
        if self.entries.get(external_id) == Some(&entry) {
            return Ok(());
        }

        debug!(external_id, internal_id = %entry.internal_id, "Storing mapping entry");
        self.entries.insert(external_id.to_string(), entry);
        self.persist()
    }

    /// Remove an entry and persist. Returns whether it existed.
    pub fn remove(&mut self, external_id: &str) -> MappingResult<bool> {
        let external_id = external_id.trim();
        if self.entries.remove(external_id).is_none() {
            return Ok(false);
        }
        debug!(external_id, "Removed mapping entry");
        self.persist()?;
        Ok(true)
    }

    /// Re-read the table from disk, discarding in-memory state.
    pub fn reload(&mut self) {
        self.entries = load_entries(&self.path, &self.table);
    }

    fn persist(&self) -> MappingResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file());
            writer.write_record(self.table.headers())?;
            for (external_id, entry) in &self.entries {
                let internal_id = entry.internal_id.to_string();
                writer.write_record([
                    external_id.as_str(),
                    entry.kind.as_str(),
                    internal_id.as_str(),
                    entry.parent_business_key.as_deref().unwrap_or(""),
                ])?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| MappingError::Io(e.error))?;
        Ok(())
    }
}

fn write_header_only(path: &Path, table: &MappingTable) -> MappingResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.headers())?;
    writer.flush()?;
    Ok(())
}

fn load_entries(path: &Path, table: &MappingTable) -> BTreeMap<String, MappingEntry> {
    let mut entries = BTreeMap::new();

    if !path.exists() {
        if let Err(e) = write_header_only(path, table) {
            warn!(path = %path.display(), error = %e, "Could not create mapping file");
        }
        return entries;
    }

    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not open mapping file, starting empty");
            return entries;
        }
    };

    match reader.headers() {
        Ok(headers) => {
            let found: Vec<&str> = headers.iter().map(str::trim).collect();
            if found != table.headers() {
                warn!(
                    path = %path.display(),
                    expected = ?table.headers(),
                    found = ?found,
                    "Mapping file header mismatch, reading columns by position"
                );
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable mapping header, starting empty");
            return entries;
        }
    }

    for (row_number, row) in reader.records().enumerate() {
        let line = row_number + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(path = %path.display(), line, error = %e, "Corrupt mapping file, starting empty");
                return BTreeMap::new();
            }
        };

        let field = |i: usize| row.get(i).map(str::trim).unwrap_or("");
        let (external_id, kind, raw_id) = (field(0), field(1), field(2));
        if external_id.is_empty() || kind.is_empty() || raw_id.is_empty() {
            warn!(path = %path.display(), line, "Skipping incomplete mapping row");
            continue;
        }
        let Ok(internal_id) = InternalId::parse(raw_id) else {
            warn!(path = %path.display(), line, internal_id = raw_id, "Skipping mapping row with invalid uuid");
            continue;
        };
        let parent = Some(field(3)).filter(|p| !p.is_empty()).map(str::to_string);

        let previous = entries.insert(
            external_id.to_string(),
            MappingEntry {
                kind: kind.to_string(),
                internal_id,
                parent_business_key: parent,
            },
        );
        if previous.is_some() {
            warn!(path = %path.display(), line, external_id, "Duplicate mapping row, keeping the last one");
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ID_A: &str = "6f1c2a4e-9b0d-4c3e-8a71-2d5f0e9b1c33";
    const ID_B: &str = "0d9e8f7a-6b5c-4d3e-9f21-0a1b2c3d4e5f";

    fn store_in(dir: &TempDir) -> MappingStore {
        MappingStore::open(dir.path(), MappingTable::ORG_UNITS, "prod", "DNK")
    }

    #[test]
    fn test_file_name_and_header() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store
            .path()
            .ends_with("prod_DNK_staatskalender-dataspot-mapping.csv"));
        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.trim(), "staatskalender_id,_type,uuid,inCollection");
        assert_eq!(
            MappingTable::DATASETS.file_name("prod", "DNK"),
            "prod_DNK_ods-dataspot-mapping.csv"
        );
    }

    #[test]
    fn test_put_persists_immediately() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.put("10", "Collection", ID_A, Some("Kanton/\"Amt f. X\"")).unwrap();

        let reopened = store_in(&dir);
        let entry = reopened.get("10").unwrap();
        assert_eq!(entry.kind, "Collection");
        assert_eq!(entry.internal_id.to_string(), ID_A);
        assert_eq!(entry.parent_business_key.as_deref(), Some("Kanton/\"Amt f. X\""));
    }

    #[test]
    fn test_invalid_put_is_rejected_without_mutation() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.put("10", "Collection", ID_A, None).unwrap();

        let upper = ID_B.to_uppercase();
        for (id, kind, uuid) in [
            ("", "Collection", ID_B),
            ("10", "", ID_B),
            ("10", "Collection", ""),
            ("10", "Collection", "not-a-uuid"),
            ("10", "Collection", upper.as_str()),
        ] {
            let err = store.put(id, kind, uuid, None).unwrap_err();
            assert!(err.is_rejection(), "{err}");
        }
        assert_eq!(store.get("10").unwrap().internal_id.to_string(), ID_A);
        assert_eq!(store_in(&dir).len(), 1);
    }

    #[test]
    fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.put("1", "Collection", ID_A, None).unwrap();
        store.put("2", "Collection", ID_B, Some("A")).unwrap();

        assert!(store.remove("1").unwrap());
        assert!(!store.remove("1").unwrap());
        let reopened = store_in(&dir);
        assert_eq!(reopened.all().keys().collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn test_keys_are_trimmed_on_every_access() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.put(" 5", "Collection", ID_A, None).unwrap();

        assert!(store.get(" 5").is_some());
        assert!(store.get("5").is_some());
        assert_eq!(store.all().keys().collect::<Vec<_>>(), vec!["5"]);
        assert!(store.remove("5 ").unwrap());
        assert!(store_in(&dir).is_empty());
    }

    #[test]
    fn test_rows_are_written_sorted() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.put("b", "Collection", ID_B, None).unwrap();
        store.put("a", "Collection", ID_A, None).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let ids: Vec<&str> = content
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_header_mismatch_is_parsed_by_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(&path, format!("id,type,id2,parent\n7,Collection,{ID_A},Root\n")).unwrap();

        let store = MappingStore::open_path(&path, MappingTable::ORG_UNITS);
        assert_eq!(store.get("7").unwrap().parent_business_key.as_deref(), Some("Root"));
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.csv");
        fs::write(
            &path,
            format!(
                "staatskalender_id,_type,uuid,inCollection\n1,Collection,bogus,\n2,Collection\n3,Collection,{ID_B},\n"
            ),
        )
        .unwrap();

        let store = MappingStore::open_path(&path, MappingTable::ORG_UNITS);
        assert_eq!(store.all().keys().collect::<Vec<_>>(), vec!["3"]);
    }

    #[test]
    fn test_unreadable_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.csv");
        fs::write(&path, b"staatskalender_id,_type,uuid,inCollection\n\xff\xfe,\x00\n").unwrap();

        let store = MappingStore::open_path(&path, MappingTable::ORG_UNITS);
        assert!(store.is_empty());
    }
}
