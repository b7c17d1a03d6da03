//! # Storage Module
//!
//! Snapshot persistence behind the [`SnapshotStore`] trait.
//!
//! - `redb_store`: disk-backed store on redb
//! - [`MemorySnapshotStore`]: process-local store for tests and ephemeral runs

pub mod redb_store;

pub use redb_store::RedbSnapshotStore;

use crate::types::EngineError;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Durable home for encoded snapshots, addressed by key.
pub trait SnapshotStore {
    /// Fetch the snapshot stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;

    /// Store `bytes` under `key`, replacing any previous snapshot.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError>;
}

/// In-memory [`SnapshotStore`].
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.snapshots.lock().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.snapshots.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
