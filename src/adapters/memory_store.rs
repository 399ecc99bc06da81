//! In-memory storage adapter.
//!
//! Implements [`StoragePort`] over a path-keyed map.  Used by host tests
//! and as the simulation backend when no SD card is mounted.

use std::collections::BTreeMap;

use log::info;

use crate::app::ports::{StorageError, StoragePort};

#[derive(Default, Clone)]
pub struct MemoryStore {
    blobs: BTreeMap<String, Vec<u8>>,
    /// Refuse every write with [`StorageError::Full`] (fault injection).
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("MemoryStore: simulation backend");
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }

    /// Decode a stored JSON blob; test helper.
    pub fn json(&self, path: &str) -> Option<serde_json::Value> {
        self.blobs.get(path).and_then(|b| serde_json::from_slice(b).ok())
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

impl StoragePort for MemoryStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::Full);
        }
        self.blobs.insert(path.to_owned(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::Full);
        }
        self.blobs.remove(path);
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .blobs
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_owned)
            .collect())
    }
}
