//! The isolation engine.
//!
//! A [`Project`] drives one [`IsolatedPackage`] pipeline per requested
//! package. Each pipeline stage is a [`Job`](crate::jobs::Job) whose step is a
//! [`Step`]; the project itself is the job handler, so a stage that needs to
//! isolate a dependency re-enters the project recursively.

pub mod backup;
pub mod config;
pub mod filter;
pub mod integrate;
pub mod package;
pub mod project;
pub mod temp;

#[cfg(test)]
pub(crate) mod testing;

pub use backup::BackupStore;
pub use config::{BundleOptions, IsolationConfig, PackageOutputs, StoreTargets};
pub use filter::{pad_scope, unique_scopes, PackageFilter};
pub use integrate::Integration;
pub use package::{IsolatedPackage, BUNDLED_FILES_PATTERN, BUNDLED_PREFIX};
pub use project::{Project, ProjectEvent};
pub use temp::TempRegistry;

/// Pipeline stage of a single package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Whole-package milestone: isolate through the project cache.
    Isolate,
    /// Post-step hook of a package's last stage.
    Announce,
    Ignore,
    Build,
    Configure,
    Backup,
    IsolateDeps,
    Package,
    Store,
    Extract,
    StoreRaw,
    Zip,
    StoreZip,
}

/// A stage applied to the package at `index` in the project's package list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub stage: Stage,
}

impl Step {
    #[must_use]
    pub fn new(index: usize, stage: Stage) -> Self {
        Self { index, stage }
    }
}
