//! Disk-backed record store.
//!
//! Each store owns one base directory and keeps one subdirectory per record:
//!
//! ```text
//! <base_dir>/<id>/record.yaml   serialized snapshot
//! <base_dir>/<id>/config/       the record's config_path
//! ```
//!
//! All operations on one store are serialized by a single store-wide lock,
//! held across the map access and whatever disk I/O the operation triggers.
//! Independent stores do not contend.

mod record;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

pub use record::{Artifact, FieldExtractor, FieldValue, Record, write_artifacts};

const SNAPSHOT_FILE: &str = "record.yaml";
const SNAPSHOT_TMP_FILE: &str = "record.yaml.tmp";
const CONFIG_DIR: &str = "config";

/// Concurrency-safe collection of typed records, persisted under `base_dir`.
pub struct RecordStore<T> {
    base_dir: PathBuf,
    extractor: FieldExtractor<T>,
    records: Mutex<HashMap<String, Record<T>>>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open the store, creating `base_dir` if needed and loading every record
    /// found there. Corrupt records are purged from disk.
    pub async fn open(base_dir: impl Into<PathBuf>, extractor: FieldExtractor<T>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| Error::io("create", &base_dir, e))?;

        let records = load_records(&base_dir).await?;

        Ok(Self {
            base_dir,
            extractor,
            records: Mutex::new(records),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Construct a new record with a fresh id and create its config directory.
    ///
    /// The record is not stored until it is passed to [`RecordStore::add`].
    pub async fn new_record(&self, name: &str, payload: T) -> Result<Record<T>> {
        let id = Uuid::new_v4().to_string();
        let config_path = self.base_dir.join(&id).join(CONFIG_DIR);
        fs::create_dir_all(&config_path)
            .await
            .map_err(|e| Error::io("create", &config_path, e))?;

        Ok(Record {
            id,
            name: name.to_string(),
            config_path,
            created_at: Utc::now(),
            payload,
        })
    }

    /// Insert or overwrite a record, then persist its snapshot.
    ///
    /// On a disk failure the in-memory entry stays updated. Callers should
    /// treat a failed add as indeterminate and check with [`RecordStore::get`].
    pub async fn add(&self, id: &str, record: Record<T>) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidInput("record id is empty".to_string()));
        }
        if record.id != id {
            return Err(Error::InvalidInput(format!(
                "record id {} does not match key {}",
                record.id, id
            )));
        }

        let mut records = self.records.lock().await;
        records.insert(id.to_string(), record);
        let record = &records[id];

        self.persist(record).await?;
        debug!(id = %id, name = %record.name, "Record saved");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Record<T>> {
        if id.is_empty() {
            return Err(Error::InvalidInput("record id is empty".to_string()));
        }

        let records = self.records.lock().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("record {}", id)))
    }

    /// All records. Order is unspecified.
    pub async fn list(&self) -> Vec<Record<T>> {
        let records = self.records.lock().await;
        records.values().cloned().collect()
    }

    /// Records whose string field `field` equals `value`, stopping at the
    /// first match. An empty `value` lists everything.
    ///
    /// With duplicates, which match is returned is unspecified. Prefer
    /// [`RecordStore::list_filter_many`] for general queries.
    pub async fn list_filter(&self, field: &str, value: &str) -> Result<Vec<Record<T>>> {
        if value.is_empty() {
            return Ok(self.list().await);
        }

        let records = self.records.lock().await;
        for record in records.values() {
            if self.matches(record, field, value)? {
                return Ok(vec![record.clone()]);
            }
        }
        Ok(Vec::new())
    }

    /// Every record whose string field `field` equals `value`. An empty
    /// `value` lists everything.
    pub async fn list_filter_many(&self, field: &str, value: &str) -> Result<Vec<Record<T>>> {
        if value.is_empty() {
            return Ok(self.list().await);
        }

        let records = self.records.lock().await;
        let mut found = Vec::new();
        for record in records.values() {
            if self.matches(record, field, value)? {
                found.push(record.clone());
            }
        }
        Ok(found)
    }

    /// Remove a record from memory and, best-effort, from disk.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidInput("record id is empty".to_string()));
        }

        let mut records = self.records.lock().await;
        let record = records
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("record {}", id)))?;

        let dir = self.base_dir.join(id);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!(
                id = %id,
                path = %dir.display(),
                error = %e,
                "Failed to remove record directory, leaving it behind"
            );
        }

        debug!(id = %id, name = %record.name, "Record deleted");
        Ok(())
    }

    fn matches(&self, record: &Record<T>, field: &str, value: &str) -> Result<bool> {
        match (self.extractor)(record, field) {
            FieldValue::Str(v) => Ok(v == Some(value)),
            FieldValue::NotString => Err(Error::InvalidFilter(format!(
                "field '{}' is not a string field",
                field
            ))),
            FieldValue::Unknown => Err(Error::InvalidFilter(format!("unknown field '{}'", field))),
        }
    }

    async fn persist(&self, record: &Record<T>) -> Result<()> {
        let dir = self.base_dir.join(&record.id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io("create", &dir, e))?;

        let yaml = serde_saphyr::to_string(record).map_err(|source| Error::Encode {
            id: record.id.clone(),
            source,
        })?;

        let temp_path = dir.join(SNAPSHOT_TMP_FILE);
        let final_path = dir.join(SNAPSHOT_FILE);
        fs::write(&temp_path, yaml.as_bytes())
            .await
            .map_err(|e| Error::io("write", &temp_path, e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| Error::io("rename", &final_path, e))?;

        Ok(())
    }
}

async fn load_records<T: DeserializeOwned>(base_dir: &Path) -> Result<HashMap<String, Record<T>>> {
    let mut records = HashMap::new();
    let mut purged = 0usize;

    let mut entries = fs::read_dir(base_dir)
        .await
        .map_err(|e| Error::io("read", base_dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io("read", base_dir, e))?
    {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let id = entry.file_name().to_string_lossy().to_string();
        match read_snapshot::<T>(&path.join(SNAPSHOT_FILE)).await {
            Ok(record) if record.id == id => {
                records.insert(id, record);
            }
            Ok(record) => {
                warn!(dir = %id, record_id = %record.id, "Snapshot id does not match its directory, purging");
                purge(&path).await;
                purged += 1;
            }
            Err(e) => {
                warn!(dir = %id, error = %e, "Corrupt record, purging");
                purge(&path).await;
                purged += 1;
            }
        }
    }

    info!(
        base_dir = %base_dir.display(),
        loaded = records.len(),
        purged,
        "Loaded records"
    );
    Ok(records)
}

async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Record<T>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| Error::io("read", path, e))?;

    serde_saphyr::from_str(&content).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })
}

async fn purge(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        warn!(path = %dir.display(), error = %e, "Failed to purge corrupt record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Disk {
        size_gb: u64,
        pool: Option<String>,
    }

    fn disk_field<'a>(record: &'a Record<Disk>, field: &str) -> FieldValue<'a> {
        match field {
            "pool" => FieldValue::Str(record.payload.pool.as_deref()),
            "size_gb" => FieldValue::NotString,
            _ => record.base_field(field),
        }
    }

    async fn open(dir: &TempDir) -> RecordStore<Disk> {
        RecordStore::open(dir.path().join("disks"), disk_field)
            .await
            .unwrap()
    }

    async fn add(store: &RecordStore<Disk>, name: &str, pool: Option<&str>) -> Record<Disk> {
        let disk = Disk {
            size_gb: 10,
            pool: pool.map(str::to_string),
        };
        let record = store.new_record(name, disk).await.unwrap();
        store.add(&record.id, record.clone()).await.unwrap();
        record
    }

    fn ids(records: &[Record<Disk>]) -> HashSet<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        let record = add(&store, "data", Some("fast")).await;
        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched, record);

        assert!(store.base_dir().join(&record.id).join(SNAPSHOT_FILE).is_file());
        assert!(record.config_path.is_dir());
    }

    #[tokio::test]
    async fn test_empty_id_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        assert!(matches!(store.get("").await, Err(Error::InvalidInput(_))));
        assert!(matches!(store.delete("").await, Err(Error::InvalidInput(_))));

        let record = store
            .new_record("x", Disk { size_gb: 1, pool: None })
            .await
            .unwrap();
        assert!(matches!(
            store.add("", record).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        assert!(matches!(store.get("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        let record = add(&store, "data", None).await;
        store.delete(&record.id).await.unwrap();

        assert!(matches!(store.get(&record.id).await, Err(Error::NotFound(_))));
        assert!(!store.base_dir().join(&record.id).exists());
        assert!(matches!(
            store.delete(&record.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_filter_value_lists_all() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        add(&store, "a", None).await;
        add(&store, "b", Some("fast")).await;
        add(&store, "c", Some("slow")).await;

        let all = store.list().await;
        let filtered = store.list_filter("name", "").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(ids(&all), ids(&filtered));

        let many = store.list_filter_many("pool", "").await.unwrap();
        assert_eq!(ids(&all), ids(&many));
    }

    #[tokio::test]
    async fn test_filter_by_payload_field() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        add(&store, "a", None).await;
        let b = add(&store, "b", Some("fast")).await;

        let found = store.list_filter("pool", "fast").await.unwrap();
        assert_eq!(found, vec![b]);
        assert!(store.list_filter("pool", "slow").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_names_first_match_vs_many() {
        // Insert in both orders; list_filter may return either duplicate.
        for first_pool in ["fast", "slow"] {
            let dir = TempDir::new().unwrap();
            let store = open(&dir).await;
            let second_pool = if first_pool == "fast" { "slow" } else { "fast" };

            let first = add(&store, "dup", Some(first_pool)).await;
            let second = add(&store, "dup", Some(second_pool)).await;
            add(&store, "other", None).await;

            let one = store.list_filter("name", "dup").await.unwrap();
            assert_eq!(one.len(), 1);
            assert!(one[0].id == first.id || one[0].id == second.id);

            let many = store.list_filter_many("name", "dup").await.unwrap();
            assert_eq!(
                ids(&many),
                HashSet::from([first.id.clone(), second.id.clone()])
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_filter() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        add(&store, "a", None).await;

        assert!(matches!(
            store.list_filter("colour", "red").await,
            Err(Error::InvalidFilter(_))
        ));
        assert!(matches!(
            store.list_filter_many("size_gb", "10").await,
            Err(Error::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_after_restart() {
        let dir = TempDir::new().unwrap();
        let before = {
            let store = open(&dir).await;
            add(&store, "a", None).await;
            add(&store, "b", Some("fast")).await;
            let gone = add(&store, "c", None).await;
            store.delete(&gone.id).await.unwrap();
            store.list().await
        };

        let store = open(&dir).await;
        let mut after = store.list().await;
        let mut before = before;
        before.sort_by(|a, b| a.id.cmp(&b.id));
        after.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_corrupt_records_are_purged_on_load() {
        let dir = TempDir::new().unwrap();
        let kept = {
            let store = open(&dir).await;
            add(&store, "good", None).await
        };

        let base = dir.path().join("disks");
        let garbage = base.join("garbage");
        std::fs::create_dir_all(&garbage).unwrap();
        std::fs::write(garbage.join(SNAPSHOT_FILE), "{{ not yaml").unwrap();

        // Config dir created but never saved.
        let unsaved = base.join("unsaved").join(CONFIG_DIR);
        std::fs::create_dir_all(&unsaved).unwrap();

        // Stray file at the top level is not a record.
        std::fs::write(base.join("README"), "hello").unwrap();

        let store = open(&dir).await;
        assert_eq!(store.list().await, vec![kept]);
        assert!(!garbage.exists());
        assert!(!base.join("unsaved").exists());
        assert!(base.join("README").exists());
    }

    #[tokio::test]
    async fn test_snapshot_in_wrong_directory_is_purged() {
        let dir = TempDir::new().unwrap();
        let record = {
            let store = open(&dir).await;
            add(&store, "moved", None).await
        };

        let base = dir.path().join("disks");
        std::fs::rename(base.join(&record.id), base.join("elsewhere")).unwrap();

        let store = open(&dir).await;
        assert!(store.list().await.is_empty());
        assert!(!base.join("elsewhere").exists());
    }

    #[tokio::test]
    async fn test_add_rejects_mismatched_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;
        let record = store
            .new_record("x", Disk { size_gb: 1, pool: None })
            .await
            .unwrap();

        assert!(matches!(
            store.add("other-id", record).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.list().await.is_empty());
    }
}
