//! A workspace package together with its isolation state.

use super::backup::BackupStore;
use super::config::{BundleOptions, IsolationConfig};
use super::Stage;
use crate::error::{IsolateError, Result};
use crate::workspace::manifest;
use crate::workspace::WorkspacePackage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of dependency archives bundled into a package directory.
pub const BUNDLED_PREFIX: &str = "isolated-";

/// Allow-list entry that ships bundled archives with the package.
pub const BUNDLED_FILES_PATTERN: &str = "isolated-*.tgz";

#[derive(Debug, Clone)]
pub struct IsolatedPackage {
    pub package: WorkspacePackage,
    pub config: IsolationConfig,
    initialized: bool,
    /// Dependencies resolved by bundling, in declaration order.
    pub(crate) bundled: Vec<String>,
    /// Packed tarball in a temp location.
    pub(crate) tarball: Option<PathBuf>,
    /// Unpacked tarball in a temp location.
    pub(crate) extracted: Option<PathBuf>,
    pub(crate) zip: Option<PathBuf>,
    /// Whether a lockfile existed when the package was backed up.
    pub(crate) had_lockfile: Option<bool>,
}

impl IsolatedPackage {
    /// Wrap a catalog package, resolving its configuration.
    pub fn new(package: WorkspacePackage) -> Result<Self> {
        let config = IsolationConfig::from_manifest(&package.manifest_path(), &package.manifest)?;
        Ok(Self {
            package,
            config,
            initialized: false,
            bundled: Vec::new(),
            tarball: None,
            extracted: None,
            zip: None,
            had_lockfile: None,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.package.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.package.version
    }

    #[must_use]
    pub fn location(&self) -> &Path {
        &self.package.location
    }

    #[must_use]
    pub fn is_private(&self) -> bool {
        self.package.private
    }

    /// Names of the dependencies that were bundled into this package.
    #[must_use]
    pub fn bundled_dependencies(&self) -> &[String] {
        &self.bundled
    }

    /// Re-read the manifest from disk and apply batch overrides.
    ///
    /// Runs at most once per package; later calls are no-ops.
    pub async fn initialize(&mut self, options: &BundleOptions) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        let manifest = manifest::read_manifest(&self.package.manifest_path()).await?;
        self.package.reload(manifest)?;
        self.config = IsolationConfig::from_manifest(&self.package.manifest_path(), &self.package.manifest)?
            .with_options(options);
        self.initialized = true;
        debug!(package = %self.name(), config = ?self.config, "initialized");
        Ok(())
    }

    fn versioned(&self, base: &str, extension: &str) -> String {
        if self.config.version_neutral {
            format!("{base}{extension}")
        } else {
            format!("{base}-{}{extension}", self.package.version)
        }
    }

    /// `<safeName>-<version>.tgz`, or `<safeName>.tgz` when version-neutral.
    #[must_use]
    pub fn archive_name(&self) -> String {
        self.versioned(&self.package.safe_name(), ".tgz")
    }

    #[must_use]
    pub fn zip_name(&self) -> String {
        self.versioned(&self.package.safe_name(), ".zip")
    }

    /// Directory name of the extracted output.
    #[must_use]
    pub fn raw_name(&self) -> String {
        self.versioned(&self.package.safe_name(), "")
    }

    /// File name this package's archive gets inside a depending package.
    #[must_use]
    pub fn bundled_archive_name(&self) -> String {
        format!("{BUNDLED_PREFIX}{}", self.archive_name())
    }

    /// Manifest entry pointing a depending package at the bundled archive.
    #[must_use]
    pub fn bundled_reference(&self) -> String {
        format!("file:{}", self.bundled_archive_name())
    }

    /// Where an artifact named `file_name` is stored.
    #[must_use]
    pub fn store_paths(&self, dist: &Path, file_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if self.config.store.local {
            paths.push(self.location().join(file_name));
        }
        if self.config.store.root {
            paths.push(dist.join(file_name));
        }
        paths
    }

    /// Ordered pipeline for this package.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, Stage)> {
        if self.config.ignore {
            return vec![("Ignore", Stage::Ignore)];
        }

        let mut stages = Vec::new();
        if self.config.build {
            stages.push(("Build", Stage::Build));
        }

        if self.config.isolate {
            stages.push(("Configure", Stage::Configure));
            stages.push(("Backup", Stage::Backup));
            stages.push(("Isolate deps for", Stage::IsolateDeps));
            stages.push(("Package", Stage::Package));

            if self.config.package.npm {
                stages.push(("Store", Stage::Store));
            }
            if self.config.needs_extract() {
                stages.push(("Extract", Stage::Extract));
            }
            if self.config.package.raw {
                stages.push(("Store raw", Stage::StoreRaw));
            }
            if self.config.package.zip {
                stages.push(("Zip", Stage::Zip));
                stages.push(("Store zip", Stage::StoreZip));
            }
        }

        if stages.is_empty() {
            stages.push(("Ignore", Stage::Ignore));
        }
        stages
    }

    /// Require a `files` allow-list and make it ship bundled archives.
    pub async fn configure(&mut self, backups: &mut BackupStore) -> Result<()> {
        if manifest::files_allow_list(&self.package.manifest).is_none() {
            return Err(IsolateError::MisconfiguredFiles {
                package: self.package.name.clone(),
            });
        }

        let mut updated = self.package.manifest.clone();
        if manifest::ensure_files_entry(&mut updated, BUNDLED_FILES_PATTERN) {
            self.write_manifest(backups, updated).await?;
        }
        Ok(())
    }

    /// Snapshot manifest and lockfile.
    pub async fn backup(&mut self, backups: &mut BackupStore) -> Result<()> {
        backups.protect(&self.package.manifest_path()).await?;

        let lockfile = self.package.lockfile_path();
        let had_lockfile = isolate_util::fs::exists(&lockfile)
            .await
            .map_err(|e| IsolateError::io(&lockfile, e))?
            .is_some();
        backups.protect(&lockfile).await?;

        // First observation wins
        self.had_lockfile.get_or_insert(had_lockfile);
        Ok(())
    }

    /// Point each bundled dependency at its archive.
    ///
    /// The manifest is re-read first since `npm install` may have rewritten it.
    pub async fn reference_bundled(
        &mut self,
        backups: &mut BackupStore,
        references: &[(String, String)],
    ) -> Result<()> {
        if references.is_empty() {
            return Ok(());
        }

        let mut updated = manifest::read_manifest(&self.package.manifest_path()).await?;
        for (name, reference) in references {
            manifest::set_dependency(&mut updated, name, reference);
        }
        self.write_manifest(backups, updated).await
    }

    async fn write_manifest(
        &mut self,
        backups: &mut BackupStore,
        updated: serde_json::Value,
    ) -> Result<()> {
        let path = self.package.manifest_path();
        backups.protect(&path).await?;
        manifest::write_manifest(&path, &updated).await?;
        debug!(path = %path.display(), "manifest updated");
        self.package.reload(updated)
    }

    /// Bundled archives currently sitting in the package directory.
    pub async fn bundled_files(&self) -> Result<Vec<PathBuf>> {
        let location = self.location();
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(location)
            .await
            .map_err(|e| IsolateError::io(location, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IsolateError::io(location, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(BUNDLED_PREFIX) && name.ends_with(".tgz") {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Undo this run's changes to the package directory.
    ///
    /// Removes a lockfile generated during the run and bundled archives, then
    /// restores manifest and lockfile from their backups.
    pub async fn cleanup(&mut self, backups: &mut BackupStore) -> Result<()> {
        let lockfile = self.package.lockfile_path();
        if self.had_lockfile == Some(false) {
            isolate_util::fs::ensure_unlink(&lockfile)
                .await
                .map_err(|e| IsolateError::io(&lockfile, e))?;
        }

        for file in self.bundled_files().await? {
            debug!(path = %file.display(), "removing bundled archive");
            isolate_util::fs::ensure_unlink(&file)
                .await
                .map_err(|e| IsolateError::io(&file, e))?;
        }

        let manifest_path = self.package.manifest_path();
        let restored = backups.restore(&manifest_path).await?;
        backups.restore(&lockfile).await?;

        if restored {
            let original = manifest::read_manifest(&manifest_path).await?;
            self.package.reload(original)?;
        }
        self.had_lockfile = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MANIFEST_NAME;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn package_at(dir: &Path, manifest: serde_json::Value) -> IsolatedPackage {
        fs::write(
            dir.join(MANIFEST_NAME),
            serde_json::to_vec_pretty(&manifest).unwrap(),
        )
        .unwrap();
        IsolatedPackage::new(WorkspacePackage::from_manifest(dir, manifest).unwrap()).unwrap()
    }

    #[test]
    fn test_artifact_names() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "@org/a", "version": "1.2.3"}));

        assert_eq!(pkg.archive_name(), "org-a-1.2.3.tgz");
        assert_eq!(pkg.zip_name(), "org-a-1.2.3.zip");
        assert_eq!(pkg.raw_name(), "org-a-1.2.3");
        assert_eq!(pkg.bundled_archive_name(), "isolated-org-a-1.2.3.tgz");
        assert_eq!(pkg.bundled_reference(), "file:isolated-org-a-1.2.3.tgz");

        pkg.config.version_neutral = true;
        assert_eq!(pkg.archive_name(), "org-a.tgz");
        assert_eq!(pkg.zip_name(), "org-a.zip");
        assert_eq!(pkg.bundled_reference(), "file:isolated-org-a.tgz");
    }

    #[test]
    fn test_store_paths() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "a", "version": "0.0.0"}));
        let dist = Path::new("/ws/dist");

        assert_eq!(pkg.store_paths(dist, "a.tgz"), vec![dist.join("a.tgz")]);

        pkg.config.store.local = true;
        pkg.config.store.root = false;
        assert_eq!(pkg.store_paths(dist, "a.tgz"), vec![dir.path().join("a.tgz")]);
    }

    #[test]
    fn test_stage_lists() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(
            dir.path(),
            json!({"name": "a", "scripts": {"build": "tsc"}, "files": []}),
        );
        let names = |pkg: &IsolatedPackage| -> Vec<&'static str> {
            pkg.stages().into_iter().map(|(label, _)| label).collect()
        };

        assert_eq!(
            names(&pkg),
            ["Build", "Configure", "Backup", "Isolate deps for", "Package", "Store"]
        );

        pkg.config.package.zip = true;
        pkg.config.package.npm = false;
        assert_eq!(
            names(&pkg),
            ["Build", "Configure", "Backup", "Isolate deps for", "Package", "Extract", "Zip", "Store zip"]
        );

        pkg.config.isolate = false;
        assert_eq!(names(&pkg), ["Build"]);

        pkg.config.build = false;
        assert_eq!(names(&pkg), ["Ignore"]);

        pkg.config.ignore = true;
        pkg.config.build = true;
        assert_eq!(names(&pkg), ["Ignore"]);
    }

    #[tokio::test]
    async fn test_configure_requires_files() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "b"}));
        let mut backups = BackupStore::new();

        let err = pkg.configure(&mut backups).await.unwrap_err();
        assert_eq!(err.code(), crate::codes::ISOLATE_MISCONFIGURED_FILES);
        assert!(backups.is_empty());
    }

    #[tokio::test]
    async fn test_configure_adds_pattern_once_with_backup() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "b", "files": ["lib"]}));
        let original = fs::read(dir.path().join(MANIFEST_NAME)).unwrap();
        let mut backups = BackupStore::new();

        pkg.configure(&mut backups).await.unwrap();
        pkg.configure(&mut backups).await.unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(MANIFEST_NAME)).unwrap()).unwrap();
        assert_eq!(on_disk["files"], json!(["lib", "isolated-*.tgz"]));
        assert_eq!(backups.len(), 1);

        pkg.cleanup(&mut backups).await.unwrap();
        assert_eq!(fs::read(dir.path().join(MANIFEST_NAME)).unwrap(), original);
        assert_eq!(pkg.package.manifest["files"], json!(["lib"]));
    }

    #[tokio::test]
    async fn test_cleanup_removes_generated_lockfile_and_archives() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "b", "files": ["isolated-*.tgz"]}));
        fs::write(dir.path().join("keep-me.tgz"), b"x").unwrap();
        let mut backups = BackupStore::new();

        pkg.backup(&mut backups).await.unwrap();
        fs::write(dir.path().join("package-lock.json"), b"{}").unwrap();
        fs::write(dir.path().join("isolated-a-0.0.0.tgz"), b"x").unwrap();
        assert_eq!(pkg.bundled_files().await.unwrap().len(), 1);

        pkg.cleanup(&mut backups).await.unwrap();

        assert!(!dir.path().join("package-lock.json").exists());
        assert!(!dir.path().join("isolated-a-0.0.0.tgz").exists());
        assert!(dir.path().join("keep-me.tgz").exists());
        assert!(backups.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_restores_existing_lockfile() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "b", "files": []}));
        let lockfile = dir.path().join("package-lock.json");
        fs::write(&lockfile, b"{\"lockfileVersion\": 3}").unwrap();
        let mut backups = BackupStore::new();

        pkg.backup(&mut backups).await.unwrap();
        fs::write(&lockfile, b"{\"lockfileVersion\": 3, \"changed\": true}").unwrap();
        pkg.cleanup(&mut backups).await.unwrap();

        assert_eq!(fs::read(&lockfile).unwrap(), b"{\"lockfileVersion\": 3}");
    }

    #[tokio::test]
    async fn test_cleanup_of_untouched_package_keeps_lockfile() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(dir.path(), json!({"name": "b"}));
        let lockfile = dir.path().join("package-lock.json");
        fs::write(&lockfile, b"{}").unwrap();

        pkg.cleanup(&mut BackupStore::new()).await.unwrap();
        assert!(lockfile.exists());
    }

    #[tokio::test]
    async fn test_reference_bundled_rewrites_entries_in_place() {
        let dir = tempdir().unwrap();
        let mut pkg = package_at(
            dir.path(),
            json!({"name": "b", "files": [], "dependencies": {"a": "file:../a", "left-pad": "^1.3.0"}}),
        );
        let mut backups = BackupStore::new();
        pkg.backup(&mut backups).await.unwrap();

        pkg.reference_bundled(
            &mut backups,
            &[("a".to_string(), "file:isolated-a-0.0.0.tgz".to_string())],
        )
        .await
        .unwrap();

        assert_eq!(
            pkg.package.dependencies,
            vec![
                ("a".to_string(), "file:isolated-a-0.0.0.tgz".to_string()),
                ("left-pad".to_string(), "^1.3.0".to_string()),
            ]
        );
    }
}
