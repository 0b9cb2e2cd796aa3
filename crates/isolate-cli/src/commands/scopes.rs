//! `isolate scopes` command implementation.

use super::{fail, open_project, print_names};
use isolate_core::isolate::unique_scopes;
use isolate_core::{Config, PackageFilter};
use miette::Result;

/// Print the scopes in use, in first-seen order.
pub fn run(config: &Config, with_script: Option<&str>) -> Result<()> {
    let json = config.json_logs;
    let mut project = open_project(config).map_err(|e| fail(&e, json))?;

    let filter = PackageFilter {
        with_script: with_script.map(str::to_string),
        ..PackageFilter::default()
    };
    let packages = project.filter_packages(&filter).map_err(|e| fail(&e, json))?;
    let scopes = unique_scopes(packages);

    print_names("scopes", &scopes, json);
    Ok(())
}
