//! Isolation error types.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, printed by the CLI and carried in JSON output.
pub mod codes {
    pub const ISOLATE_MISCONFIGURED_FILES: &str = "ISOLATE_MISCONFIGURED_FILES";
    pub const ISOLATE_PRIVATE_PACKAGE: &str = "ISOLATE_PRIVATE_PACKAGE";
    pub const ISOLATE_PACKAGE_NOT_PUBLISHED: &str = "ISOLATE_PACKAGE_NOT_PUBLISHED";
    pub const ISOLATE_TOOL_FAILED: &str = "ISOLATE_TOOL_FAILED";
    pub const ISOLATE_IO: &str = "ISOLATE_IO";
    pub const ISOLATE_MANIFEST_INVALID: &str = "ISOLATE_MANIFEST_INVALID";
    pub const ISOLATE_PACKAGE_UNKNOWN: &str = "ISOLATE_PACKAGE_UNKNOWN";
    pub const ISOLATE_DEPENDENCY_CYCLE: &str = "ISOLATE_DEPENDENCY_CYCLE";
    pub const ISOLATE_WORKSPACE_NOT_FOUND: &str = "ISOLATE_WORKSPACE_NOT_FOUND";
    pub const ISOLATE_ARCHIVE_FAILED: &str = "ISOLATE_ARCHIVE_FAILED";
    pub const ISOLATE_NOTHING_TO_BUNDLE: &str = "ISOLATE_NOTHING_TO_BUNDLE";
}

pub type Result<T, E = IsolateError> = std::result::Result<T, E>;

/// Error raised while discovering or isolating workspace packages.
#[derive(Error, Debug)]
pub enum IsolateError {
    #[error("Module {package} does not have \"files\" key configured in package.json")]
    MisconfiguredFiles { package: String },

    /// Control-flow signal: the dependency may not be installed from the registry.
    #[error("Cannot install {name}@{version} because it is private")]
    PrivatePackage { name: String, version: String },

    /// Control-flow signal: the registry does not know this name/version.
    #[error("{name}@{version} is not published to the registry")]
    PackageDoesNotExist {
        name: String,
        version: String,
        output: String,
    },

    #[error("`{command}` failed in {cwd} ({status})\n{output}")]
    ToolFailure {
        command: String,
        cwd: PathBuf,
        status: String,
        output: String,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest at {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("Package {name} is not part of the workspace")]
    PackageUnknown { name: String },

    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("No workspace root found from {start}")]
    WorkspaceNotFound { start: PathBuf },

    #[error("Archive operation failed: {0}")]
    Archive(String),

    /// A dependency had to be bundled but its pipeline produced no tarball.
    #[error("Cannot bundle {name}: it was not packed (ignored or not isolated?)")]
    NothingToBundle { name: String },
}

impl IsolateError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MisconfiguredFiles { .. } => codes::ISOLATE_MISCONFIGURED_FILES,
            Self::PrivatePackage { .. } => codes::ISOLATE_PRIVATE_PACKAGE,
            Self::PackageDoesNotExist { .. } => codes::ISOLATE_PACKAGE_NOT_PUBLISHED,
            Self::ToolFailure { .. } => codes::ISOLATE_TOOL_FAILED,
            Self::Io { .. } => codes::ISOLATE_IO,
            Self::ManifestInvalid { .. } => codes::ISOLATE_MANIFEST_INVALID,
            Self::PackageUnknown { .. } => codes::ISOLATE_PACKAGE_UNKNOWN,
            Self::DependencyCycle { .. } => codes::ISOLATE_DEPENDENCY_CYCLE,
            Self::WorkspaceNotFound { .. } => codes::ISOLATE_WORKSPACE_NOT_FOUND,
            Self::Archive(_) => codes::ISOLATE_ARCHIVE_FAILED,
            Self::NothingToBundle { .. } => codes::ISOLATE_NOTHING_TO_BUNDLE,
        }
    }

    /// Whether the dependency integrator should answer this error by bundling.
    #[must_use]
    pub fn calls_for_bundling(&self) -> bool {
        matches!(
            self,
            Self::PrivatePackage { .. } | Self::PackageDoesNotExist { .. }
        )
    }

    /// Wrap an IO error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn manifest_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }
}

/// Attach the offending path to IO errors.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| IsolateError::io(path, e))
    }
}
