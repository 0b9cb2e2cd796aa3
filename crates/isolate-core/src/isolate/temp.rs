//! Ephemeral resources of an isolation run.

use crate::error::{IsolateError, Result};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

const TEMP_PREFIX: &str = "isolate-";

#[derive(Debug)]
enum TempEntry {
    /// A path created by someone else.
    Path(PathBuf),
    File(TempPath),
    Dir(TempDir),
}

impl TempEntry {
    fn path(&self) -> &Path {
        match self {
            Self::Path(path) => path.as_path(),
            Self::File(file) => &**file,
            Self::Dir(dir) => dir.path(),
        }
    }
}

/// Everything registered here is deleted by [`TempRegistry::purge`].
#[derive(Debug, Default)]
pub struct TempRegistry {
    entries: Vec<TempEntry>,
}

impl TempRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing path for deletion.
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(TempEntry::Path(path.into()));
    }

    /// Create and register an empty temp directory.
    pub fn create_dir(&mut self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()
            .map_err(|e| IsolateError::io(std::env::temp_dir(), e))?;
        let path = dir.path().to_path_buf();
        self.entries.push(TempEntry::Dir(dir));
        Ok(path)
    }

    /// Create and register an empty temp file ending in `suffix`.
    pub fn create_file(&mut self, suffix: &str) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(suffix)
            .tempfile()
            .map_err(|e| IsolateError::io(std::env::temp_dir(), e))?
            .into_temp_path();
        let path = file.to_path_buf();
        self.entries.push(TempEntry::File(file));
        Ok(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path().to_path_buf()).collect()
    }

    /// Delete every registered resource, reporting the first failure.
    pub async fn purge(&mut self) -> Result<()> {
        let mut first_error = None;

        for entry in self.entries.drain(..) {
            let path = entry.path().to_path_buf();
            let result = match entry {
                TempEntry::Path(path) => isolate_util::fs::remove_path(&path).await,
                TempEntry::File(file) => file.close(),
                TempEntry::Dir(dir) => dir.close(),
            };

            match result {
                Ok(()) => debug!(path = %path.display(), "removed temp"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove temp");
                    first_error.get_or_insert(IsolateError::io(path, e));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let mut temps = TempRegistry::new();
        let dir = temps.create_dir().unwrap();
        fs::write(dir.join("inside.txt"), b"x").unwrap();
        let file = temps.create_file(".zip").unwrap();
        assert!(file.to_string_lossy().ends_with(".zip"));

        let outside = tempfile::tempdir().unwrap();
        let extra = outside.path().join("extra.tgz");
        fs::write(&extra, b"x").unwrap();
        temps.add(&extra);

        assert_eq!(temps.len(), 3);
        temps.purge().await.unwrap();

        assert!(!dir.exists());
        assert!(!file.exists());
        assert!(!extra.exists());
        assert!(temps.is_empty());
    }

    #[tokio::test]
    async fn test_purge_tolerates_already_removed() {
        let mut temps = TempRegistry::new();
        let dir = temps.create_dir().unwrap();
        fs::remove_dir_all(&dir).unwrap();
        temps.add(std::env::temp_dir().join("isolate-never-existed"));

        temps.purge().await.unwrap();
        assert!(temps.is_empty());
    }
}
