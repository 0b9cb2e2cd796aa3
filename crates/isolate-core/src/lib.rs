#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod isolate;
pub mod jobs;
pub mod tools;
pub mod version;
pub mod workspace;

pub use config::Config;
pub use error::{codes, IsolateError, Result};
pub use isolate::{
    BundleOptions, IsolatedPackage, IsolationConfig, PackageFilter, Project, ProjectEvent,
};
pub use jobs::{Job, JobHandler, JobRunner, Progress};
pub use tools::{InstallOutcome, NpmToolchain, Toolchain};
pub use version::VERSION;
pub use workspace::{find_workspace_root, WorkspacePackage};
