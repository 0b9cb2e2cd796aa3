//! In-process stand-ins for npm and workspace fixtures.

use super::project::Project;
use crate::error::{IsolateError, Result};
use crate::jobs::JobRunner;
use crate::tools::{InstallOutcome, Toolchain};
use crate::workspace::catalog::safe_name;
use crate::workspace::manifest::{files_allow_list, read_manifest, LOCKFILE_NAME, MANIFEST_NAME};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Directory listing taken when a package was packed.
#[derive(Debug, Clone)]
pub struct PackSnapshot {
    pub package: String,
    pub files: Vec<String>,
}

/// Scripted npm: every name is unpublished unless listed in `published`.
#[derive(Debug, Default)]
pub struct FakeToolchain {
    published: HashSet<String>,
    broken: HashSet<String>,
    stalled: HashSet<String>,
    stall_reached: Notify,
    calls: Mutex<Vec<String>>,
    snapshots: Mutex<Vec<PackSnapshot>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry installs of `name` succeed (and write a lockfile, like npm).
    pub fn publish(mut self, name: &str) -> Self {
        self.published.insert(name.to_string());
        self
    }

    /// Registry installs of `name` fail with an unrecognized exit status.
    pub fn break_install(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    /// `npm pack` of `name` never finishes.
    pub fn stall_pack(mut self, name: &str) -> Self {
        self.stalled.insert(name.to_string());
        self
    }

    /// Resolves once a stalled pack has been entered.
    pub async fn wait_for_stall(&self) {
        self.stall_reached.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn snapshot(&self, package: &str) -> Option<PackSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.package == package)
            .cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn pack(&self, cwd: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let manifest = read_manifest(&cwd.join(MANIFEST_NAME)).await?;
        let name = manifest["name"].as_str().unwrap_or_default().to_string();
        let version = manifest["version"].as_str().unwrap_or("0.0.0");
        self.record(format!("pack {name}"));
        if self.stalled.contains(&name) {
            self.stall_reached.notify_one();
            std::future::pending::<()>().await;
        }

        let mut files: Vec<String> = fs::read_dir(cwd)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        self.snapshots.lock().unwrap().push(PackSnapshot {
            package: name.clone(),
            files: files.clone(),
        });

        let patterns: Vec<glob::Pattern> = files_allow_list(&manifest)
            .unwrap_or_default()
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let tarball = dest_dir.join(format!("{}-{version}.tgz", safe_name(&name)));
        let gz = GzEncoder::new(File::create(&tarball).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        builder
            .append_path_with_name(cwd.join(MANIFEST_NAME), "package/package.json")
            .unwrap();
        for file in &files {
            let path = cwd.join(file);
            if !patterns.iter().any(|p| p.matches(file)) {
                continue;
            }
            if path.is_dir() {
                builder.append_dir_all(format!("package/{file}"), &path).unwrap();
            } else {
                builder
                    .append_path_with_name(&path, format!("package/{file}"))
                    .unwrap();
            }
        }
        builder.into_inner().unwrap().finish().unwrap();

        Ok(tarball)
    }

    async fn install(&self, name: &str, version: &str, cwd: &Path) -> Result<InstallOutcome> {
        self.record(format!("install {name}@{version} in {}", dir_name(cwd)));

        if self.broken.contains(name) {
            return Err(IsolateError::ToolFailure {
                command: format!("npm install {name}@{version}"),
                cwd: cwd.to_path_buf(),
                status: "exit status: 254".to_string(),
                output: "npm ERR! code EACCES".to_string(),
            });
        }
        if self.published.contains(name) {
            fs::write(cwd.join(LOCKFILE_NAME), b"{\"lockfileVersion\": 3}\n").unwrap();
            return Ok(InstallOutcome::Installed);
        }
        Ok(InstallOutcome::NotFound {
            output: format!("npm ERR! 404 '{name}@{version}' is not in this registry."),
        })
    }

    async fn run_script(&self, cwd: &Path, script: &str) -> Result<()> {
        self.record(format!("run {script} in {}", dir_name(cwd)));
        Ok(())
    }
}

/// A lerna workspace in a temp directory.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lerna.json"), "{\"version\": \"independent\"}\n").unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn package_dir(&self, dir: &str) -> PathBuf {
        self.root().join("packages").join(dir)
    }

    /// Write `packages/<dir>/package.json` plus an `index.js`.
    pub fn add(&self, dir: &str, manifest: &Value) -> PathBuf {
        let location = self.package_dir(dir);
        fs::create_dir_all(&location).unwrap();
        let mut text = serde_json::to_string_pretty(manifest).unwrap();
        text.push('\n');
        fs::write(location.join(MANIFEST_NAME), text).unwrap();
        fs::write(location.join("index.js"), b"module.exports = {};\n").unwrap();
        location
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.root().join(relative)).unwrap()
    }

    pub fn project(&self, toolchain: &Arc<FakeToolchain>) -> Project {
        let toolchain: Arc<dyn Toolchain> = Arc::clone(toolchain) as Arc<dyn Toolchain>;
        Project::new(self.root(), Arc::new(JobRunner::new()), toolchain)
    }
}

/// Entry names of a gzipped tarball.
pub fn tarball_entries(path: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
}

/// `package/package.json` of a packed tarball.
pub fn tarball_manifest(path: &Path) -> Value {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap() == Path::new("package/package.json") {
            let mut text = String::new();
            entry.read_to_string(&mut text).unwrap();
            return serde_json::from_str(&text).unwrap();
        }
    }
    panic!("no package.json in {}", path.display());
}
