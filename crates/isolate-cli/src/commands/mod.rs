pub mod bundle;
pub mod clean;
pub mod list;
pub mod packages;
pub mod scopes;
pub mod version;

use isolate_core::{Config, IsolateError, JobRunner, NpmToolchain, Project, Toolchain};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Open the workspace enclosing the configured cwd.
pub fn open_project(config: &Config) -> Result<Project, IsolateError> {
    let npm = config
        .npm_program()
        .map_or_else(NpmToolchain::new, NpmToolchain::with_program);
    let toolchain: Arc<dyn Toolchain> = Arc::new(npm);
    Project::discover(&config.cwd, Arc::new(JobRunner::new()), toolchain)
}

/// Report a core error.
///
/// With `--json` the error object goes to stdout and the process exits 1;
/// otherwise the error is handed back to miette for rendering.
pub fn fail(err: &IsolateError, json: bool) -> miette::Report {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": false,
                "error": {
                    "code": err.code(),
                    "message": err.to_string()
                }
            })
        );
        std::process::exit(1);
    }
    miette::miette!(code = err.code(), "{err}")
}

/// Print a list of names, one per line or as `{"ok":true,"<key>":[...]}`.
pub fn print_names(key: &str, names: &[String], json: bool) {
    if json {
        let mut out = serde_json::Map::new();
        out.insert("ok".to_string(), serde_json::Value::Bool(true));
        out.insert(key.to_string(), serde_json::json!(names));
        println!("{}", serde_json::Value::Object(out));
    } else {
        for name in names {
            println!("{name}");
        }
    }
}

/// `path` expressed relative to `base`, climbing with `..` where needed.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 && path.is_absolute() != base.is_absolute() {
        return path.to_path_buf();
    }

    let mut relative: PathBuf = base_parts[common..].iter().map(|_| "..").collect();
    relative.extend(&path_parts[common..]);
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_below_base() {
        assert_eq!(
            relative_path(Path::new("/ws/dist/a-1.0.0.tgz"), Path::new("/ws")),
            PathBuf::from("dist/a-1.0.0.tgz")
        );
    }

    #[test]
    fn test_relative_path_climbs() {
        assert_eq!(
            relative_path(Path::new("/ws/dist/a.tgz"), Path::new("/ws/packages/b")),
            PathBuf::from("../../dist/a.tgz")
        );
    }

    #[test]
    fn test_relative_path_same_dir() {
        assert_eq!(relative_path(Path::new("/ws"), Path::new("/ws")), PathBuf::from("."));
    }
}
