//! `isolate clean` command implementation.
//!
//! Removes `<root>/dist` and the archives stored next to package manifests.

use super::{fail, relative_path};
use isolate_core::workspace::{find_workspace_root, workspace_patterns};
use isolate_core::{Config, IsolateError};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

const ARCHIVE_EXTENSIONS: &[&str] = &["tgz", "zip"];

/// Names starting with this prefix are fixtures, never generated output.
const KEEP_PREFIX: &str = "__";

/// Run the clean command.
pub fn run(config: &Config) -> Result<()> {
    let json = config.json_logs;
    let root = find_workspace_root(&config.cwd).ok_or_else(|| {
        fail(
            &IsolateError::WorkspaceNotFound {
                start: config.cwd.clone(),
            },
            json,
        )
    })?;

    let targets = collect_targets(&root);

    if !json && !targets.is_empty() {
        println!("Cleaning {}", root.display());
    }

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let mut removed = Vec::new();
    for target in &targets {
        let display = relative_path(target, &root).display().to_string();
        if !json {
            println!("Remove {display}");
        }
        runtime
            .block_on(isolate_util::fs::remove_path(target))
            .map_err(|e| fail(&IsolateError::io(target, e), json))?;
        removed.push(display);
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "root": root.to_string_lossy(),
                "removed": removed
            })
        );
    } else if removed.is_empty() {
        println!("Nothing to do");
    }

    Ok(())
}

/// Generated paths under `root`, sorted.
fn collect_targets(root: &Path) -> Vec<PathBuf> {
    let mut targets = Vec::new();

    let dist = root.join("dist");
    if dist.exists() {
        targets.push(dist);
    }

    for pattern in workspace_patterns(root) {
        for ext in ARCHIVE_EXTENSIONS {
            let full = root.join(&pattern).join(format!("*.{ext}"));
            let Ok(entries) = glob::glob(&full.to_string_lossy()) else {
                continue;
            };
            for path in entries.flatten() {
                let keep = path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(KEEP_PREFIX));
                if path.is_file() && !keep && !targets.contains(&path) {
                    targets.push(path);
                }
            }
        }
    }

    targets.sort();
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_targets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("lerna.json"), "{}").unwrap();
        let pkg = root.join("packages").join("a");
        fs::create_dir_all(&pkg).unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(pkg.join("a-1.0.0.tgz"), b"").unwrap();
        fs::write(pkg.join("a.zip"), b"").unwrap();
        fs::write(pkg.join("__fixture.tgz"), b"").unwrap();
        fs::write(pkg.join("index.js"), b"").unwrap();

        let targets = collect_targets(root);

        assert_eq!(
            targets,
            vec![root.join("dist"), pkg.join("a-1.0.0.tgz"), pkg.join("a.zip")]
        );
    }

    #[test]
    fn test_collect_targets_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lerna.json"), "{}").unwrap();
        assert!(collect_targets(dir.path()).is_empty());
    }
}
