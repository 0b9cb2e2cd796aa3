//! `isolate packages` command implementation.

use super::{fail, open_project, print_names};
use isolate_core::{Config, PackageFilter};
use miette::Result;

/// Print workspace packages narrowed by scope and script.
///
/// With `--scope` the scope prefix is dropped from the printed names.
pub fn run(config: &Config, scope: Option<&str>, with_script: Option<&str>) -> Result<()> {
    let json = config.json_logs;
    let mut project = open_project(config).map_err(|e| fail(&e, json))?;

    let filter = PackageFilter {
        scope: scope.map(str::to_string),
        with_script: with_script.map(str::to_string),
        ..PackageFilter::default()
    };
    let names: Vec<String> = project
        .filter_packages(&filter)
        .map_err(|e| fail(&e, json))?
        .iter()
        .map(|p| {
            if scope.is_some() {
                p.package.unscoped_name().to_string()
            } else {
                p.name().to_string()
            }
        })
        .collect();

    print_names("packages", &names, json);
    Ok(())
}
