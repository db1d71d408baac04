// # File Snapshot Store
//
// File-based implementation of SnapshotStore with crash recovery.
//
// ## Why every put hits the disk
//
// The orchestrator persists the identity of a freshly created resource
// before it does anything else. If that write were buffered, a crash between
// create and flush would leave an untracked remote resource. `put` and
// `remove` therefore write through.
//
// ## Crash Recovery
//
// - Atomic writes: write to `<path>.tmp`, then rename over the state file
// - Backup: the previous state file is copied to `<path>.backup` first
// - Corruption: an unparsable state file is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "monitor.api": {
//       "kind": "monitor",
//       "identity": "mon_abc123",
//       "attributes": { "name": "api", "paused": false },
//       "last_synced": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::snapshot_store::{SnapshotRecord, SnapshotStore, SnapshotStoreFactory};

/// Snapshot file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based snapshot store
///
/// # Example
///
/// ```rust,no_run
/// use monsync_core::state::FileSnapshotStore;
/// use monsync_core::traits::{ResourceKind, SnapshotRecord, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSnapshotStore::new("/var/lib/monsync/state.json").await?;
///     let record = SnapshotRecord::partial(ResourceKind::Monitor, "mon_1");
///     store.put("monitor.api", &record).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    // Held across the disk write so concurrent puts cannot interleave renames
    records: Mutex<BTreeMap<String, SnapshotRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFileFormat {
    version: String,
    records: BTreeMap<String, SnapshotRecord>,
}

impl FileSnapshotStore {
    /// Create or load a file snapshot store
    ///
    /// Missing parent directories are created. A corrupted file is recovered
    /// from its backup; if the backup is unusable too, loading fails rather
    /// than starting empty, because an empty store would make the next pass
    /// create duplicates of every tracked resource.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let records = Self::load_with_recovery(&path).await?;
        tracing::debug!("Loaded {} snapshot records from {}", records.len(), path.display());

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, SnapshotRecord>, Error> {
        let content = match Self::read_if_exists(path).await? {
            Some(content) => content,
            None => return Ok(BTreeMap::new()),
        };

        match Self::parse(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    "State file {} is corrupted ({}), attempting recovery from backup",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                let backup = Self::read_if_exists(&backup_path).await?.ok_or_else(|| {
                    Error::state_store(format!(
                        "state file {} is corrupted and no backup exists",
                        path.display()
                    ))
                })?;
                let records = Self::parse(&backup).map_err(|backup_err| {
                    Error::state_store(format!(
                        "state file {} and its backup are both corrupted: {}",
                        path.display(),
                        backup_err
                    ))
                })?;

                fs::copy(&backup_path, path).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to restore {} from backup: {}",
                        path.display(),
                        e
                    ))
                })?;
                tracing::info!("Recovered {} snapshot records from backup", records.len());
                Ok(records)
            }
        }
    }

    async fn read_if_exists(path: &Path) -> Result<Option<String>, Error> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn parse(content: &str) -> Result<BTreeMap<String, SnapshotRecord>, Error> {
        let file: StateFileFormat = serde_json::from_str(content)?;
        if file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                file.version
            );
        }
        Ok(file.records)
    }

    /// Write all records atomically (temp file, backup, rename)
    async fn write_records(&self, records: &BTreeMap<String, SnapshotRecord>) -> Result<(), Error> {
        let file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::state_store(format!("Failed to serialize snapshots: {}", e)))?;

        let temp_path = Self::temp_path(&self.path);
        {
            let mut handle = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!("Failed to create {}: {}", temp_path.display(), e))
            })?;
            handle.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!("Failed to write {}: {}", temp_path.display(), e))
            })?;
            handle.sync_all().await.map_err(|e| {
                Error::state_store(format!("Failed to sync {}: {}", temp_path.display(), e))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create state backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Snapshots written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, address: &str) -> Result<Option<SnapshotRecord>, Error> {
        Ok(self.records.lock().await.get(address).cloned())
    }

    async fn put(&self, address: &str, record: &SnapshotRecord) -> Result<(), Error> {
        let mut records = self.records.lock().await;
        let previous = records.insert(address.to_string(), record.clone());
        if let Err(e) = self.write_records(&records).await {
            // keep memory consistent with disk
            match previous {
                Some(previous) => records.insert(address.to_string(), previous),
                None => records.remove(address),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, address: &str) -> Result<(), Error> {
        let mut records = self.records.lock().await;
        let Some(previous) = records.remove(address) else {
            return Ok(());
        };
        if let Err(e) = self.write_records(&records).await {
            records.insert(address.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.records.lock().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // put/remove write through
        Ok(())
    }
}

/// Factory registered under `file`
///
/// Expects the serialized `StateStoreConfig::File { path }`.
#[derive(Debug, Default)]
pub struct FileSnapshotStoreFactory;

#[async_trait]
impl SnapshotStoreFactory for FileSnapshotStoreFactory {
    async fn create(&self, config: &Value) -> Result<Box<dyn SnapshotStore>, Error> {
        let path = config
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::config("file state store requires a \"path\""))?;
        Ok(Box::new(FileSnapshotStore::new(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ResourceKind;
    use serde_json::json;
    use tempfile::tempdir;

    fn monitor(name: &str) -> SnapshotRecord {
        SnapshotRecord::complete(ResourceKind::Monitor, "mon_1", json!({ "name": name }))
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileSnapshotStore::new(&path).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        store.put("monitor.api", &monitor("api")).await.unwrap();
        store
            .put("incident.db", &SnapshotRecord::partial(ResourceKind::Incident, "inc_1"))
            .await
            .unwrap();
        assert!(path.exists());

        let reloaded = FileSnapshotStore::new(&path).await.unwrap();
        assert_eq!(reloaded.get("monitor.api").await.unwrap(), Some(monitor("api")));
        let partial = reloaded.get("incident.db").await.unwrap().unwrap();
        assert!(partial.is_partial());
        assert_eq!(partial.identity, "inc_1");
    }

    #[tokio::test]
    async fn corrupted_file_recovers_previous_state_from_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileSnapshotStore::new(&path).await.unwrap();
        store.put("monitor.api", &monitor("first")).await.unwrap();
        store.put("monitor.api", &monitor("second")).await.unwrap();
        assert!(FileSnapshotStore::backup_path(&path).exists());

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileSnapshotStore::new(&path).await.unwrap();
        assert_eq!(recovered.get("monitor.api").await.unwrap(), Some(monitor("first")));
    }

    #[tokio::test]
    async fn corrupted_file_without_backup_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let err = FileSnapshotStore::new(&path).await.unwrap_err();
        assert!(matches!(err, Error::StateStore(_)));
    }

    #[tokio::test]
    async fn remove_writes_through() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileSnapshotStore::new(&path).await.unwrap();
        store.put("monitor.api", &monitor("api")).await.unwrap();
        store.remove("monitor.api").await.unwrap();
        store.remove("monitor.api").await.unwrap();

        let reloaded = FileSnapshotStore::new(&path).await.unwrap();
        assert!(reloaded.get("monitor.api").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn factory_requires_path() {
        let dir = tempdir().unwrap();
        let factory = FileSnapshotStoreFactory;
        assert!(factory.create(&json!({ "type": "file" })).await.is_err());

        let path = dir.path().join("state.json");
        let store = factory
            .create(&json!({ "type": "file", "path": path }))
            .await
            .unwrap();
        store.put("monitor.api", &monitor("api")).await.unwrap();
        assert!(path.exists());
    }
}
