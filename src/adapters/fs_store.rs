//! Filesystem-backed [`StoragePort`] for the SD card.
//!
//! Paths are relative to a mount root.  Writes go through a sibling
//! temporary file and a rename so a power cut never leaves a half-written
//! task or valve file behind.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use log::warn;

use crate::app::ports::{StorageError, StoragePort};

pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }
}

/// Collapse an I/O failure into the port's error, logging the full chain.
fn storage_error(err: &anyhow::Error) -> StorageError {
    match err.downcast_ref::<std::io::Error>().map(std::io::Error::kind) {
        Some(ErrorKind::NotFound) => StorageError::NotFound,
        Some(ErrorKind::StorageFull) => {
            warn!("DirectoryStore: {:#}", err);
            StorageError::Full
        }
        _ => {
            warn!("DirectoryStore: {:#}", err);
            StorageError::IoError
        }
    }
}

impl StoragePort for DirectoryStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.path(path);
        fs::read(&full)
            .with_context(|| format!("reading {}", full.display()))
            .map_err(|e| storage_error(&e))
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let full = self.path(path);
        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let tmp = full.with_extension("tmp");
            fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
            fs::rename(&tmp, &full).with_context(|| format!("renaming onto {}", full.display()))?;
            Ok(())
        })();
        result.map_err(|e| storage_error(&e))
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.path(path);
        match fs::remove_file(&full) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other
                .with_context(|| format!("removing {}", full.display()))
                .map_err(|e| storage_error(&e)),
        }
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let full = self.path(dir);
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(storage_error(
                    &anyhow::Error::new(e).context(format!("listing {}", full.display())),
                ));
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("listing {}", full.display()))
                .map_err(|e| storage_error(&e))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.ends_with(".tmp") => names.push(name.to_owned()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }
}
