//! `isolate list` command implementation.

use super::{fail, open_project, print_names};
use isolate_core::Config;
use miette::Result;

/// Print the name of every workspace package.
pub fn run(config: &Config) -> Result<()> {
    let json = config.json_logs;
    let mut project = open_project(config).map_err(|e| fail(&e, json))?;
    let names = project.package_names().map_err(|e| fail(&e, json))?;

    print_names("packages", &names, json);
    Ok(())
}
