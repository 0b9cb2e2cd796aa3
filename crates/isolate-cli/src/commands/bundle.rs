//! `isolate bundle` command implementation.
//!
//! Isolates the requested packages and lists the created artifacts.

use super::{fail, open_project, relative_path};
use isolate_core::{BundleOptions, Config, PackageFilter, ProjectEvent};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Run the bundle command.
pub fn run(
    config: &Config,
    names: &[String],
    scope: Option<&str>,
    options: BundleOptions,
) -> Result<()> {
    let json = config.json_logs;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let mut project = open_project(config).map_err(|e| fail(&e, json))?;

    project.on(|event| match event {
        ProjectEvent::PackageStarted { name } => debug!(package = %name, "isolating"),
        ProjectEvent::PackageIsolated { name } => info!(package = %name, "isolated"),
        ProjectEvent::ProductAdded { path } => debug!(path = %path.display(), "created"),
    });

    // --scope only narrows the implicit "everything" selection
    let targets: Vec<String> = match scope {
        Some(scope) if names.is_empty() => {
            let filter = PackageFilter {
                scope: Some(scope.to_string()),
                ..PackageFilter::default()
            };
            let selected: Vec<String> = project
                .filter_packages(&filter)
                .map_err(|e| fail(&e, json))?
                .iter()
                .map(|p| p.name().to_string())
                .collect();
            if selected.is_empty() {
                print_created(&[], config, json);
                return Ok(());
            }
            selected
        }
        _ => names.to_vec(),
    };

    let outcome = runtime.block_on(async {
        tokio::select! {
            result = project.isolate_packages(&targets, options) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    });

    match outcome {
        Some(Ok(products)) => {
            print_created(&products, config, json);
            Ok(())
        }
        Some(Err(e)) => Err(fail(&e, json)),
        None => {
            warn!("interrupted, restoring workspace");
            if let Err(e) = runtime.block_on(project.cleanup()) {
                warn!(error = %e, "cleanup after interrupt failed");
            }
            eprintln!("error: interrupted");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

fn print_created(products: &[PathBuf], config: &Config, json: bool) {
    let mut created: Vec<String> = products
        .iter()
        .map(|p| relative_path(p, &config.cwd).display().to_string())
        .collect();
    created.sort();
    created.dedup();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "created": created
            })
        );
    } else if created.is_empty() {
        println!("Nothing created.");
    } else {
        println!("Created:");
        for path in &created {
            println!("  {path}");
        }
    }
}
