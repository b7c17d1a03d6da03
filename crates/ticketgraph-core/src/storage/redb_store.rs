//! # redb-backed Snapshot Storage
//!
//! Keeps named snapshots in a redb embedded database, giving:
//! - ACID commit per save
//! - Crash safety (copy-on-write B-trees)
//! - Concurrent readers, single writer

use super::SnapshotStore;
use crate::types::EngineError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};

/// Table for snapshots: key -> snapshot bytes (header + payload)
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

fn storage_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Storage(e.to_string())
}

/// A disk-backed snapshot store.
pub struct RedbSnapshotStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbSnapshotStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbSnapshotStore {
    /// Open or create a snapshot database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(|e| EngineError::Io(e.to_string()))?;

        // Create the table up front so reads on a fresh file succeed.
        let write_txn = db.begin_write().map_err(storage_error)?;
        let _ = write_txn.open_table(SNAPSHOTS).map_err(storage_error)?;
        write_txn.commit().map_err(storage_error)?;

        tracing::debug!(path = %path.display(), "opened snapshot store");
        Ok(Self { db, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys of every stored snapshot, sorted.
    pub fn keys(&self) -> Result<Vec<String>, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(SNAPSHOTS).map_err(storage_error)?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(storage_error)? {
            let (key, _) = entry.map_err(storage_error)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl SnapshotStore for RedbSnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(SNAPSHOTS).map_err(storage_error)?;
        Ok(table
            .get(key)
            .map_err(storage_error)?
            .map(|value| value.value().to_vec()))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = write_txn.open_table(SNAPSHOTS).map_err(storage_error)?;
            table.insert(key, bytes).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        tracing::debug!(key, size = bytes.len(), "snapshot saved");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_key_loads_none() {
        let dir = tempdir().expect("tempdir");
        let store = RedbSnapshotStore::open(dir.path().join("snapshots.redb")).expect("open");
        assert_eq!(store.load("default").expect("load"), None);
    }

    #[test]
    fn save_then_load_and_overwrite() {
        let dir = tempdir().expect("tempdir");
        let store = RedbSnapshotStore::open(dir.path().join("snapshots.redb")).expect("open");

        store.save("default", b"first").expect("save");
        store.save("default", b"second").expect("save");
        store.save("backup", b"other").expect("save");

        assert_eq!(
            store.load("default").expect("load").as_deref(),
            Some(&b"second"[..])
        );
        assert_eq!(store.keys().expect("keys"), vec!["backup", "default"]);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("snapshots.redb");
        {
            let store = RedbSnapshotStore::open(&path).expect("open");
            store.save("default", b"persisted").expect("save");
        }
        let store = RedbSnapshotStore::open(&path).expect("reopen");
        assert_eq!(
            store.load("default").expect("load").as_deref(),
            Some(&b"persisted"[..])
        );
    }
}
