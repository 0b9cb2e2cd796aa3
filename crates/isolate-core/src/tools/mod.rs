//! External packaging tools.
//!
//! The isolation engine only talks to the package manager through the
//! [`Toolchain`] trait, so tests can substitute a scripted implementation.

pub mod archive;
pub mod npm;
pub mod process;

pub use archive::{extract_tarball, zip_directory};
pub use npm::NpmToolchain;
pub use process::{CommandOutput, ToolCommand};

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result of a registry install that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The registry served the package.
    Installed,
    /// The registry does not know the requested name/version.
    NotFound { output: String },
}

/// Package-manager operations used by the isolator.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Pack the package in `cwd` into a tarball inside `dest_dir`, returning its path.
    async fn pack(&self, cwd: &Path, dest_dir: &Path) -> Result<PathBuf>;

    /// Install `name@version` (production dependencies only) in `cwd`.
    ///
    /// Unrecognized failures are returned as `ToolFailure`.
    async fn install(&self, name: &str, version: &str, cwd: &Path) -> Result<InstallOutcome>;

    /// Run a manifest script in `cwd`.
    async fn run_script(&self, cwd: &Path, script: &str) -> Result<()>;
}
