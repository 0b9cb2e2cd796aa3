//! Manifest and lockfile backups.
//!
//! A backup is taken the first time a path needs protecting and consumed when
//! it is restored. Records are keyed by absolute path, so every package that
//! touches the same file shares one backup.

use crate::error::{IoContext, IsolateError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct BackupStore {
    records: HashMap<PathBuf, NamedTempFile>,
}

impl BackupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `path` unless it already has a backup.
    ///
    /// Returns `true` when a new backup was taken; `false` when one already
    /// existed or there is no file at `path`.
    pub async fn protect(&mut self, path: &Path) -> Result<bool> {
        if self.records.contains_key(path) {
            return Ok(false);
        }
        if isolate_util::fs::exists(path).await.at(path)?.is_none() {
            return Ok(false);
        }

        let copy = tempfile::Builder::new()
            .prefix("isolate-backup-")
            .tempfile()
            .map_err(|e| IsolateError::io(std::env::temp_dir(), e))?;
        tokio::fs::copy(path, copy.path()).await.at(path)?;

        debug!(path = %path.display(), backup = %copy.path().display(), "backed up");
        self.records.insert(path.to_path_buf(), copy);
        Ok(true)
    }

    /// Put the original bytes of `path` back and drop its backup.
    ///
    /// Returns `false` when `path` had no backup.
    pub async fn restore(&mut self, path: &Path) -> Result<bool> {
        let Some(copy) = self.records.remove(path) else {
            return Ok(false);
        };

        tokio::fs::copy(copy.path(), path).await.at(path)?;
        debug!(path = %path.display(), "restored");
        Ok(true)
    }

    /// Restore every remaining backup, reporting the first failure.
    pub async fn restore_all(&mut self) -> Result<()> {
        let mut paths: Vec<PathBuf> = self.records.keys().cloned().collect();
        paths.sort();

        let mut first_error = None;
        for path in paths {
            if let Err(e) = self.restore(&path).await {
                warn!(path = %path.display(), error = %e, "restore failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
