//! Scoped external process execution.
//!
//! Every child is spawned with `kill_on_drop`, so dropping an in-flight
//! [`ToolCommand::output`] future (Ctrl-C, a failed sibling branch) terminates
//! the child before the caller unwinds.

use crate::error::{IsolateError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Maximum number of output lines carried in a failure report.
const FAILURE_TAIL_LINES: usize = 20;

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code, `-1` when the process was killed by a signal.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last lines of stderr (stdout when stderr is empty), for error reports.
    #[must_use]
    pub fn tail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().collect();
        let start = lines.len().saturating_sub(FAILURE_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// An external command bound to a working directory.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    cwd: PathBuf,
}

impl ToolCommand {
    pub fn new(program: impl Into<OsString>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Run to completion, capturing stdout and stderr.
    ///
    /// A spawn failure is a `ToolFailure`; a nonzero exit is returned to the
    /// caller for classification.
    pub async fn output(&self) -> Result<CommandOutput> {
        debug!(command = %self.display(), cwd = %self.cwd.display(), "spawning");

        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IsolateError::ToolFailure {
                command: self.display(),
                cwd: self.cwd.clone(),
                status: "failed to spawn".to_string(),
                output: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| IsolateError::io(&self.cwd, e))?;

        let output = CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(command = %self.display(), code = output.code(), "finished");
        Ok(output)
    }

    /// Run and require a zero exit status.
    pub async fn run(&self) -> Result<CommandOutput> {
        let output = self.output().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.failure(&output))
        }
    }

    /// Build the `ToolFailure` for a finished command.
    #[must_use]
    pub fn failure(&self, output: &CommandOutput) -> IsolateError {
        IsolateError::ToolFailure {
            command: self.display(),
            cwd: self.cwd.clone(),
            status: output.status.to_string(),
            output: output.tail(),
        }
    }
}
