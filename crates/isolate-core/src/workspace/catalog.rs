//! Workspace package discovery.
//!
//! Reads package globs from `lerna.json` (`packages`, default `packages/*`) or
//! from the `workspaces` field of the root package.json, and loads every
//! package directory matched by them.

use super::manifest::{self, LOCKFILE_NAME, MANIFEST_NAME};
use crate::error::{IsolateError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LERNA_CONFIG_NAME: &str = "lerna.json";

const DEFAULT_PACKAGE_GLOB: &str = "packages/*";

/// A package discovered in the workspace.
#[derive(Debug, Clone)]
pub struct WorkspacePackage {
    /// Package name from package.json
    pub name: String,
    /// Version from package.json (`0.0.0` when absent)
    pub version: String,
    /// Absolute path to the package directory
    pub location: PathBuf,
    /// Parsed package.json
    pub manifest: Value,
    /// `"private": true` in package.json
    pub private: bool,
    /// Runtime dependencies in declaration order
    pub dependencies: Vec<(String, String)>,
    pub scripts: BTreeMap<String, String>,
}

impl WorkspacePackage {
    /// Build a package from its directory and parsed manifest.
    pub fn from_manifest(location: &Path, manifest: Value) -> Result<Self> {
        let manifest_path = location.join(MANIFEST_NAME);
        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| IsolateError::manifest_invalid(&manifest_path, "missing \"name\""))?
            .to_string();
        let version = manifest
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0")
            .to_string();
        let private = manifest
            .get("private")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            name,
            version,
            location: location.to_path_buf(),
            dependencies: manifest::declared_dependencies(&manifest),
            scripts: manifest::scripts(&manifest),
            private,
            manifest,
        })
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.location.join(MANIFEST_NAME)
    }

    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        self.location.join(LOCKFILE_NAME)
    }

    /// Name usable in file names: `@scope/pkg` becomes `scope-pkg`.
    #[must_use]
    pub fn safe_name(&self) -> String {
        safe_name(&self.name)
    }

    /// `@scope` for scoped packages, the bare name otherwise.
    #[must_use]
    pub fn scope(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }

    /// The part after the scope; the whole name for unscoped packages.
    #[must_use]
    pub fn unscoped_name(&self) -> &str {
        self.name.split_once('/').map_or(&self.name, |(_, rest)| rest)
    }

    #[must_use]
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }

    /// Replace the manifest and refresh the fields derived from it.
    pub fn reload(&mut self, manifest: Value) -> Result<()> {
        *self = Self::from_manifest(&self.location, manifest)?;
        Ok(())
    }
}

/// Normalize registry-scope punctuation for use in file names.
#[must_use]
pub fn safe_name(name: &str) -> String {
    name.replacen('@', "", 1).replacen('/', "-", 1)
}

/// Find the workspace root by walking up the directory tree.
///
/// Returns the first directory holding a `lerna.json`, or a package.json with
/// a "workspaces" field.
#[must_use]
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(LERNA_CONFIG_NAME).is_file() {
            return Some(current);
        }

        if let Some(package) = read_json(&current.join(MANIFEST_NAME)) {
            if package.get("workspaces").is_some() {
                return Some(current);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Package glob patterns configured for a workspace root.
#[must_use]
pub fn workspace_patterns(root: &Path) -> Vec<String> {
    if let Some(lerna) = read_json(&root.join(LERNA_CONFIG_NAME)) {
        let patterns = string_array(lerna.get("packages"));
        return if patterns.is_empty() {
            vec![DEFAULT_PACKAGE_GLOB.to_string()]
        } else {
            patterns
        };
    }

    let Some(package) = read_json(&root.join(MANIFEST_NAME)) else {
        return vec![DEFAULT_PACKAGE_GLOB.to_string()];
    };

    // Workspaces can be an array or an object with "packages" field
    match package.get("workspaces") {
        Some(Value::Array(_)) => string_array(package.get("workspaces")),
        Some(Value::Object(obj)) => string_array(obj.get("packages")),
        _ => vec![DEFAULT_PACKAGE_GLOB.to_string()],
    }
}

/// Discover all workspace packages under `root`, ordered by location.
pub fn discover_packages(root: &Path) -> Result<Vec<WorkspacePackage>> {
    let mut seen = HashSet::new();
    let mut packages = Vec::new();

    for pattern in workspace_patterns(root) {
        let full_pattern = root.join(&pattern);
        let pattern_str = full_pattern.to_string_lossy();

        let entries = glob::glob(&pattern_str).map_err(|e| {
            IsolateError::manifest_invalid(root, format!("Bad workspace glob '{pattern}': {e}"))
        })?;

        for dir in entries.flatten() {
            if !dir.is_dir() || !seen.insert(dir.clone()) {
                continue;
            }
            let manifest_path = dir.join(MANIFEST_NAME);
            let Ok(content) = std::fs::read_to_string(&manifest_path) else {
                continue;
            };
            let manifest = manifest::parse_manifest(&manifest_path, &content)?;
            let package = WorkspacePackage::from_manifest(&dir, manifest)?;
            debug!(name = %package.name, location = %dir.display(), "discovered package");
            packages.push(package);
        }
    }

    packages.sort_by(|a, b| a.location.cmp(&b.location));
    Ok(packages)
}

fn read_json(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
