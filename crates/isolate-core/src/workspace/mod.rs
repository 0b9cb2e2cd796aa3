//! Workspace catalog: finds the workspace root, lists its packages and reads
//! their manifests.

pub mod catalog;
pub mod manifest;

pub use catalog::{
    discover_packages, find_workspace_root, safe_name, workspace_patterns, WorkspacePackage,
    LERNA_CONFIG_NAME,
};
pub use manifest::{LOCKFILE_NAME, MANIFEST_NAME};
