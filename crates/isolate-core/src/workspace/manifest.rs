//! package.json reading and editing.
//!
//! Manifests are kept as `serde_json::Value` with key order preserved, so a
//! rewritten manifest only differs from the original where it was edited.

use crate::error::{IoContext, IsolateError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

pub const MANIFEST_NAME: &str = "package.json";
pub const LOCKFILE_NAME: &str = "package-lock.json";

/// Parse manifest text, requiring a JSON object at the root.
pub fn parse_manifest(path: &Path, content: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| IsolateError::manifest_invalid(path, format!("Invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(IsolateError::manifest_invalid(
            path,
            "package.json must be a JSON object",
        ));
    }

    Ok(value)
}

/// Read and parse a manifest from disk.
pub async fn read_manifest(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path).await.at(path)?;
    parse_manifest(path, &content)
}

/// Serialize a manifest the way npm writes it: two-space indent, trailing newline.
pub fn render_manifest(manifest: &Value) -> Vec<u8> {
    let mut out = serde_json::to_vec_pretty(manifest).unwrap_or_else(|_| b"{}".to_vec());
    out.push(b'\n');
    out
}

/// Atomically persist a manifest.
pub async fn write_manifest(path: &Path, manifest: &Value) -> Result<()> {
    isolate_util::fs::atomic_write(path, &render_manifest(manifest))
        .await
        .at(path)
}

/// Runtime dependencies as `(name, spec)` pairs in declaration order.
///
/// Entries whose spec is not a string are skipped with a warning.
#[must_use]
pub fn declared_dependencies(manifest: &Value) -> Vec<(String, String)> {
    let Some(section) = manifest.get("dependencies") else {
        return Vec::new();
    };

    let Some(section) = section.as_object() else {
        warn!(
            "'dependencies' must be an object, got {}",
            json_type_name(section)
        );
        return Vec::new();
    };

    section
        .iter()
        .filter_map(|(name, spec)| match spec.as_str() {
            Some(spec) => Some((name.clone(), spec.to_string())),
            None => {
                warn!(
                    "Invalid range for '{name}': expected string, got {}",
                    json_type_name(spec)
                );
                None
            }
        })
        .collect()
}

/// Scripts section as name -> command.
#[must_use]
pub fn scripts(manifest: &Value) -> BTreeMap<String, String> {
    manifest
        .get("scripts")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|cmd| (k.clone(), cmd.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// The `files` allow-list, if the manifest declares one.
#[must_use]
pub fn files_allow_list(manifest: &Value) -> Option<Vec<String>> {
    manifest.get("files").and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    })
}

/// Append `pattern` to the `files` allow-list. Returns `true` if the manifest changed.
pub fn ensure_files_entry(manifest: &mut Value, pattern: &str) -> bool {
    let Some(files) = manifest.get_mut("files").and_then(Value::as_array_mut) else {
        return false;
    };

    if files.iter().any(|v| v.as_str() == Some(pattern)) {
        return false;
    }

    files.push(Value::String(pattern.to_string()));
    true
}

/// Rewrite (or add) a runtime dependency entry.
pub fn set_dependency(manifest: &mut Value, name: &str, spec: &str) {
    let Some(root) = manifest.as_object_mut() else {
        return;
    };

    let section = root
        .entry("dependencies")
        .or_insert_with(|| Value::Object(Map::new()));

    if let Some(deps) = section.as_object_mut() {
        deps.insert(name.to_string(), Value::String(spec.to_string()));
    }
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn manifest(text: &str) -> Value {
        parse_manifest(&PathBuf::from("package.json"), text).unwrap()
    }

    #[test]
    fn test_dependencies_keep_declaration_order() {
        let m = manifest(
            r#"{
                "dependencies": {
                    "zebra": "1.0.0",
                    "apple": "file:../apple",
                    "mango": "^2.0.0"
                }
            }"#,
        );

        let names: Vec<_> = declared_dependencies(&m).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_dev_dependencies_ignored() {
        let m = manifest(
            r#"{
                "dependencies": { "a": "^1.0.0" },
                "devDependencies": { "c": "^3.0.0" }
            }"#,
        );

        assert_eq!(
            declared_dependencies(&m),
            vec![("a".to_string(), "^1.0.0".to_string())]
        );
    }

    #[test]
    fn test_invalid_range_type_skipped() {
        let m = manifest(r#"{"dependencies": {"good": "^1.0.0", "bad": 123, "worse": null}}"#);

        let deps = declared_dependencies(&m);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].0, "good");
    }

    #[test]
    fn test_invalid_section_type() {
        let m = manifest(r#"{"dependencies": "not an object"}"#);
        assert!(declared_dependencies(&m).is_empty());
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_manifest(&PathBuf::from("package.json"), "not valid json {{{").unwrap_err();
        assert_eq!(err.code(), crate::codes::ISOLATE_MANIFEST_INVALID);
    }

    #[test]
    fn test_non_object_root() {
        let err = parse_manifest(&PathBuf::from("package.json"), "[1, 2, 3]").unwrap_err();
        assert_eq!(err.code(), crate::codes::ISOLATE_MANIFEST_INVALID);
    }

    #[test]
    fn test_scripts() {
        let m = json!({"scripts": {"build": "tsc", "test": "jest", "broken": 1}});
        let s = scripts(&m);
        assert_eq!(s.len(), 2);
        assert_eq!(s["build"], "tsc");
    }

    #[test]
    fn test_files_allow_list() {
        assert_eq!(files_allow_list(&json!({"name": "a"})), None);
        assert_eq!(
            files_allow_list(&json!({"files": ["lib", "index.js"]})),
            Some(vec!["lib".to_string(), "index.js".to_string()])
        );
    }

    #[test]
    fn test_ensure_files_entry_once() {
        let mut m = json!({"files": ["lib"]});

        assert!(ensure_files_entry(&mut m, "isolated-*.tgz"));
        assert!(!ensure_files_entry(&mut m, "isolated-*.tgz"));
        assert_eq!(m["files"], json!(["lib", "isolated-*.tgz"]));
    }

    #[test]
    fn test_ensure_files_entry_without_allow_list() {
        let mut m = json!({"name": "a"});
        assert!(!ensure_files_entry(&mut m, "isolated-*.tgz"));
        assert!(m.get("files").is_none());
    }

    #[test]
    fn test_set_dependency_keeps_position() {
        let mut m = manifest(r#"{"dependencies": {"a": "file:../a", "left-pad": "^1.0.0"}}"#);

        set_dependency(&mut m, "a", "file:isolated-a-0.0.0.tgz");

        let deps = declared_dependencies(&m);
        assert_eq!(deps[0], ("a".into(), "file:isolated-a-0.0.0.tgz".into()));
        assert_eq!(deps[1].0, "left-pad");
    }

    #[test]
    fn test_set_dependency_creates_section() {
        let mut m = json!({"name": "b"});
        set_dependency(&mut m, "a", "file:isolated-a.tgz");
        assert_eq!(m["dependencies"]["a"], "file:isolated-a.tgz");
    }

    #[test]
    fn test_render_manifest_two_space_indent() {
        let rendered = render_manifest(&json!({"name": "a", "version": "1.0.0"}));
        let text = String::from_utf8(rendered).unwrap();
        assert_eq!(text, "{\n  \"name\": \"a\",\n  \"version\": \"1.0.0\"\n}\n");
    }

    #[tokio::test]
    async fn test_write_then_read_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_NAME);

        write_manifest(&path, &json!({"name": "a", "files": []})).await.unwrap();
        let back = read_manifest(&path).await.unwrap();
        assert_eq!(back["name"], "a");
    }
}
