//! Per-package isolation settings.
//!
//! Resolved once from the `isolation` section of a package.json. Both the
//! nested form and the flat colon-keyed form are accepted:
//!
//! ```json
//! { "isolation": { "versionNeutral": true, "package": { "zip": true }, "store": { "local": true } } }
//! { "isolation": { "version:neutral": true, "pack:zip": true, "store:local": true } }
//! ```
//!
//! When both spell the same option, the nested form wins.

use crate::error::{IsolateError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Which artifacts a package produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageOutputs {
    /// Store the packed `.tgz`.
    pub npm: bool,
    /// Store the extracted package tree.
    pub raw: bool,
    pub zip: bool,
}

/// Where artifacts are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTargets {
    /// `<root>/dist`
    pub root: bool,
    /// The package's own directory.
    pub local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationConfig {
    /// Run the `build` script before packaging.
    pub build: bool,
    pub ignore: bool,
    pub isolate: bool,
    pub version_neutral: bool,
    pub package: PackageOutputs,
    pub store: StoreTargets,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            build: false,
            ignore: false,
            isolate: true,
            version_neutral: false,
            package: PackageOutputs {
                npm: true,
                raw: false,
                zip: false,
            },
            store: StoreTargets {
                root: true,
                local: false,
            },
        }
    }
}

/// Batch-wide overrides given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleOptions {
    /// Also store the extracted package tree.
    pub extract: bool,
    /// Omit versions from artifact names.
    pub neutral: bool,
    pub zip: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIsolation {
    ignore: Option<bool>,
    isolate: Option<bool>,
    version_neutral: Option<bool>,
    #[serde(rename = "version:neutral")]
    version_neutral_flat: Option<bool>,
    package: Option<RawOutputs>,
    store: Option<RawStore>,
    #[serde(rename = "pack:npm")]
    pack_npm: Option<bool>,
    #[serde(rename = "pack:raw")]
    pack_raw: Option<bool>,
    #[serde(rename = "pack:zip")]
    pack_zip: Option<bool>,
    #[serde(rename = "store:root")]
    store_root: Option<bool>,
    #[serde(rename = "store:local")]
    store_local: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOutputs {
    npm: Option<bool>,
    raw: Option<bool>,
    zip: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStore {
    root: Option<bool>,
    local: Option<bool>,
}

impl IsolationConfig {
    /// Resolve the configuration of the manifest at `path`.
    pub fn from_manifest(path: &Path, manifest: &Value) -> Result<Self> {
        let raw: RawIsolation = match manifest.get("isolation") {
            None | Some(Value::Null) => RawIsolation::default(),
            Some(section) => RawIsolation::deserialize(section).map_err(|e| {
                IsolateError::manifest_invalid(path, format!("Invalid \"isolation\" section: {e}"))
            })?,
        };

        let defaults = Self::default();
        let outputs = raw.package.unwrap_or_default();
        let store = raw.store.unwrap_or_default();
        let has_build_script = manifest
            .get("scripts")
            .and_then(|s| s.get("build"))
            .and_then(Value::as_str)
            .is_some_and(|cmd| !cmd.is_empty());

        Ok(Self {
            build: has_build_script,
            ignore: raw.ignore.unwrap_or(defaults.ignore),
            isolate: raw.isolate.unwrap_or(defaults.isolate),
            version_neutral: raw
                .version_neutral
                .or(raw.version_neutral_flat)
                .unwrap_or(defaults.version_neutral),
            package: PackageOutputs {
                npm: outputs.npm.or(raw.pack_npm).unwrap_or(defaults.package.npm),
                raw: outputs.raw.or(raw.pack_raw).unwrap_or(defaults.package.raw),
                zip: outputs.zip.or(raw.pack_zip).unwrap_or(defaults.package.zip),
            },
            store: StoreTargets {
                root: store.root.or(raw.store_root).unwrap_or(defaults.store.root),
                local: store.local.or(raw.store_local).unwrap_or(defaults.store.local),
            },
        })
    }

    /// Apply batch overrides on top of the manifest settings.
    #[must_use]
    pub fn with_options(mut self, options: &BundleOptions) -> Self {
        self.package.raw |= options.extract;
        self.package.zip |= options.zip;
        self.version_neutral |= options.neutral;
        self
    }

    /// Whether the packed tarball must be unpacked.
    #[must_use]
    pub fn needs_extract(&self) -> bool {
        self.package.raw || self.package.zip
    }
}
