//! `npm` as the production [`Toolchain`].

use super::process::ToolCommand;
use super::{InstallOutcome, Toolchain};
use crate::error::{IsolateError, Result};
use crate::workspace::catalog::safe_name;
use crate::workspace::manifest::{read_manifest, MANIFEST_NAME};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// npm exits with status 1 when the registry has no such package or version,
/// but also for network and permission errors.
const NOT_FOUND_EXIT_CODE: i32 = 1;

/// Error codes npm prints for a missing package (`E404`) or version
/// (`ETARGET`).
const NOT_FOUND_ERROR_CODES: &[&str] = &["E404", "ETARGET"];

#[cfg(windows)]
const DEFAULT_PROGRAM: &str = "npm.cmd";
#[cfg(not(windows))]
const DEFAULT_PROGRAM: &str = "npm";

/// Drives the `npm` executable found on `PATH`.
#[derive(Debug, Clone)]
pub struct NpmToolchain {
    program: OsString,
    base_args: Vec<OsString>,
}

impl Default for NpmToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmToolchain {
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Use a specific npm executable.
    #[must_use]
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self::with_command(program, Vec::<OsString>::new())
    }

    /// Use `program` with leading arguments, e.g. `node /path/to/npm-cli.js`.
    #[must_use]
    pub fn with_command<I, S>(program: impl Into<OsString>, base_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            base_args: base_args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self, cwd: &Path) -> ToolCommand {
        ToolCommand::new(self.program.clone(), cwd).args(self.base_args.iter().cloned())
    }
}

#[async_trait]
impl Toolchain for NpmToolchain {
    async fn pack(&self, cwd: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let output = self
            .command(cwd)
            .arg("pack")
            .arg("--pack-destination")
            .arg(dest_dir.as_os_str())
            .run()
            .await?;

        let file_name = match output.stdout.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => line.trim().to_string(),
            None => default_tarball_name(cwd).await?,
        };

        let tarball = dest_dir.join(&file_name);
        if !tarball.is_file() {
            return Err(IsolateError::ToolFailure {
                command: "npm pack".to_string(),
                cwd: cwd.to_path_buf(),
                status: "missing output".to_string(),
                output: format!("expected {} to exist", tarball.display()),
            });
        }

        debug!(tarball = %tarball.display(), "packed");
        Ok(tarball)
    }

    async fn install(&self, name: &str, version: &str, cwd: &Path) -> Result<InstallOutcome> {
        let command = self
            .command(cwd)
            .arg("install")
            .arg(format!("{name}@{version}"))
            .args(["--omit=dev", "--omit=peer"]);

        info!(package = %name, %version, "checking registry");
        let output = command.output().await?;

        if output.success() {
            return Ok(InstallOutcome::Installed);
        }
        if output.code() == NOT_FOUND_EXIT_CODE
            && (reports_not_found(&output.stderr) || reports_not_found(&output.stdout))
        {
            return Ok(InstallOutcome::NotFound {
                output: output.tail(),
            });
        }
        Err(command.failure(&output))
    }

    async fn run_script(&self, cwd: &Path, script: &str) -> Result<()> {
        info!(%script, cwd = %cwd.display(), "running script");
        self.command(cwd).arg("run").arg(script).run().await?;
        Ok(())
    }
}

/// Whether npm's log names a not-found error code.
///
/// Matches `npm error code E404` as well as the older `npm ERR! code E404`.
fn reports_not_found(log: &str) -> bool {
    log.lines().any(|line| {
        let line = line.trim();
        let Some(rest) = line
            .strip_prefix("npm error")
            .or_else(|| line.strip_prefix("npm ERR!"))
        else {
            return false;
        };
        rest.trim()
            .strip_prefix("code ")
            .is_some_and(|code| NOT_FOUND_ERROR_CODES.contains(&code.trim()))
    })
}

/// The file name npm gives a tarball: `<safeName>-<version>.tgz`.
async fn default_tarball_name(cwd: &Path) -> Result<String> {
    let manifest = read_manifest(&cwd.join(MANIFEST_NAME)).await?;
    let name = manifest.get("name").and_then(|v| v.as_str()).unwrap_or("package");
    let version = manifest
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or("0.0.0");
    Ok(format!("{}-{version}.tgz", safe_name(name)))
}
