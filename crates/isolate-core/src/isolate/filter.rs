//! Package selection by scope, script and name.

use super::package::IsolatedPackage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    /// Registry scope, with or without the leading `@`.
    pub scope: Option<String>,
    /// Only packages declaring this script.
    pub with_script: Option<String>,
    /// Prefix of the unscoped package name.
    pub exact: Option<String>,
}

impl PackageFilter {
    #[must_use]
    pub fn matches(&self, package: &IsolatedPackage) -> bool {
        let pkg = &package.package;

        if let Some(scope) = &self.scope {
            if !pkg.name.starts_with(&format!("{}/", pad_scope(scope))) {
                return false;
            }
        }
        if let Some(script) = &self.with_script {
            if !pkg.has_script(script) {
                return false;
            }
        }
        if let Some(prefix) = &self.exact {
            if !pkg.unscoped_name().starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn apply<'a>(&self, packages: &'a [IsolatedPackage]) -> Vec<&'a IsolatedPackage> {
        packages.iter().filter(|p| self.matches(p)).collect()
    }
}

/// `org` becomes `@org`; `@org` is kept.
#[must_use]
pub fn pad_scope(scope: &str) -> String {
    if scope.starts_with('@') {
        scope.to_string()
    } else {
        format!("@{scope}")
    }
}

/// Scopes of `packages` in first-seen order.
#[must_use]
pub fn unique_scopes<'a>(packages: impl IntoIterator<Item = &'a IsolatedPackage>) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for package in packages {
        let scope = package.package.scope();
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspacePackage;
    use serde_json::json;
    use std::path::Path;

    fn packages() -> Vec<IsolatedPackage> {
        [
            json!({"name": "@org/web", "scripts": {"build": "vite build"}}),
            json!({"name": "@org/worker", "scripts": {"test": "jest"}}),
            json!({"name": "@tools/lint", "scripts": {"build": "tsc"}}),
            json!({"name": "plain"}),
        ]
        .into_iter()
        .map(|m| {
            let pkg = WorkspacePackage::from_manifest(Path::new("/ws/packages/x"), m).unwrap();
            IsolatedPackage::new(pkg).unwrap()
        })
        .collect()
    }

    fn names(selected: &[&IsolatedPackage]) -> Vec<String> {
        selected.iter().map(|p| p.name().to_string()).collect()
    }

    #[test]
    fn test_scope_with_and_without_at() {
        let all = packages();
        let with_at = PackageFilter {
            scope: Some("@org".into()),
            ..Default::default()
        };
        let without_at = PackageFilter {
            scope: Some("org".into()),
            ..Default::default()
        };

        assert_eq!(names(&with_at.apply(&all)), ["@org/web", "@org/worker"]);
        assert_eq!(with_at.apply(&all).len(), without_at.apply(&all).len());
    }

    #[test]
    fn test_script_and_exact_prefix() {
        let all = packages();
        let filter = PackageFilter {
            with_script: Some("build".into()),
            ..Default::default()
        };
        assert_eq!(names(&filter.apply(&all)), ["@org/web", "@tools/lint"]);

        let filter = PackageFilter {
            scope: Some("org".into()),
            exact: Some("wo".into()),
            ..Default::default()
        };
        assert_eq!(names(&filter.apply(&all)), ["@org/worker"]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let all = packages();
        assert_eq!(PackageFilter::default().apply(&all).len(), all.len());
    }

    #[test]
    fn test_unique_scopes_in_order() {
        let all = packages();
        assert_eq!(unique_scopes(&all), ["@org", "@tools", "plain"]);
    }
}
