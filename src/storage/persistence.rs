//! Store snapshots and their on-disk form.

use super::memory::StoredRecord;
use crate::core::{MigrationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{Level, event};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub name: String,
    pub tables: HashMap<String, BTreeMap<String, StoredRecord>>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub table_count: usize,
}

impl SnapshotMetadata {
    pub fn describe(tables: &HashMap<String, BTreeMap<String, StoredRecord>>) -> Self {
        Self {
            created_at: Utc::now(),
            record_count: tables.values().map(BTreeMap::len).sum(),
            table_count: tables.len(),
        }
    }
}

impl StoreSnapshot {
    pub fn new(name: String, tables: HashMap<String, BTreeMap<String, StoredRecord>>) -> Self {
        let metadata = SnapshotMetadata::describe(&tables);
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            name,
            tables,
            metadata,
        }
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write the snapshot atomically: temp file in the same directory, then rename.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let parent = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            MigrationError::Io(format!("Failed to create snapshot directory: {}", e))
        })?;

        let serialized = rmp_serde::to_vec_named(snapshot).map_err(|e| {
            MigrationError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| MigrationError::Io(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| MigrationError::Io(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| MigrationError::Io(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| MigrationError::Io(format!("Failed to move snapshot into place: {}", e)))?;

        event!(
            Level::INFO,
            path = %self.snapshot_path.display(),
            store = %snapshot.name,
            records = snapshot.metadata.record_count,
            "snapshot saved"
        );
        Ok(())
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.snapshot_path)
            .map_err(|e| MigrationError::Io(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&bytes).map_err(|e| {
            MigrationError::Serialization(format!("Failed to deserialize snapshot: {}", e))
        })?;

        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(MigrationError::Serialization(format!(
                "Unsupported snapshot version {} in {}",
                snapshot.version,
                self.snapshot_path.display()
            )));
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, StorageEngine};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("store_a.snap"));
        assert!(manager.load().unwrap().is_none());

        let store = InMemoryStore::new("store_a");
        let mut txn = store.begin().await.unwrap();
        txn.put("reserved_list_shards", "tld/000000", vec![1, 2, 3]).unwrap();
        store.commit(txn).await.unwrap();

        manager.save(&store.snapshot().await).unwrap();

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.name, "store_a");
        assert_eq!(loaded.metadata.record_count, 1);
        assert_eq!(loaded.metadata.table_count, 1);
        assert_eq!(loaded.tables["reserved_list_shards"]["tld/000000"].data, vec![1, 2, 3]);
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.snap");
        fs::write(&path, b"not a snapshot").unwrap();

        let err = SnapshotManager::new(&path).load().unwrap_err();
        assert!(matches!(err, MigrationError::Serialization(_)));
    }
}
