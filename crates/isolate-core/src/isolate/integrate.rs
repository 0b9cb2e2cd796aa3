//! Registry-or-bundle decision for linked dependencies.
//!
//! | dependency private | registry install | decision |
//! |---|---|---|
//! | yes | not attempted | bundle |
//! | no | installed | registry |
//! | no | not found | bundle |
//! | no | other failure | error |

use super::package::IsolatedPackage;
use crate::error::{IsolateError, Result};
use crate::tools::{InstallOutcome, Toolchain};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    /// Leave the dependency to the registry.
    Registry,
    /// Isolate the dependency and ship its archive with the dependent.
    Bundle,
}

/// Indices of the workspace packages `package` depends on, in declaration order.
#[must_use]
pub fn linked_dependencies(package: &IsolatedPackage, workspace: &[IsolatedPackage]) -> Vec<usize> {
    package
        .package
        .dependencies
        .iter()
        .filter_map(|(name, _)| workspace.iter().position(|p| p.name() == name))
        .collect()
}

/// Install `dep` from the registry into `cwd`.
///
/// Fails with `PrivatePackage` or `PackageDoesNotExist` when the registry
/// cannot provide it.
pub async fn install_published(
    toolchain: &dyn Toolchain,
    dep: &IsolatedPackage,
    cwd: &Path,
) -> Result<()> {
    if dep.is_private() {
        return Err(IsolateError::PrivatePackage {
            name: dep.name().to_string(),
            version: dep.version().to_string(),
        });
    }

    match toolchain.install(dep.name(), dep.version(), cwd).await? {
        InstallOutcome::Installed => Ok(()),
        InstallOutcome::NotFound { output } => Err(IsolateError::PackageDoesNotExist {
            name: dep.name().to_string(),
            version: dep.version().to_string(),
            output,
        }),
    }
}

/// Decide how `dep` reaches the package in `cwd`.
pub async fn integrate_dependency(
    toolchain: &dyn Toolchain,
    dep: &IsolatedPackage,
    cwd: &Path,
) -> Result<Integration> {
    match install_published(toolchain, dep, cwd).await {
        Ok(()) => {
            debug!(dependency = %dep.name(), "resolved from registry");
            Ok(Integration::Registry)
        }
        Err(e) if e.calls_for_bundling() => {
            debug!(dependency = %dep.name(), reason = %e, "bundling");
            Ok(Integration::Bundle)
        }
        Err(e) => Err(e),
    }
}
