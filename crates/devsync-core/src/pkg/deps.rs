//! Declared dependencies of the project.
//!
//! Only `dependencies` and `devDependencies` count as declared; a package in
//! both keeps its `dependencies` spec.

use super::error::PkgError;
use crate::resolver::PackageManifest;
use std::collections::BTreeMap;
use std::path::Path;

/// Section a dependency was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepSection {
    Dependencies,
    DevDependencies,
}

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDep {
    /// Range or spec as written, e.g. `^1.2.0` or `file:../lib`.
    pub spec: String,
    pub section: DepSection,
}

impl DeclaredDep {
    /// Declared with a `file:` or `link:` spec.
    #[must_use]
    pub fn is_local(&self) -> bool {
        is_local_spec(&self.spec)
    }
}

/// The project's declared dependencies, keyed by package name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredDeps {
    entries: BTreeMap<String, DeclaredDep>,
}

impl DeclaredDeps {
    /// Build from a parsed manifest.
    #[must_use]
    pub fn from_manifest(manifest: &PackageManifest) -> Self {
        let mut entries = BTreeMap::new();
        for (name, spec) in &manifest.dev_dependencies {
            entries.insert(
                name.clone(),
                DeclaredDep {
                    spec: spec.clone(),
                    section: DepSection::DevDependencies,
                },
            );
        }
        // dependencies overwrite devDependencies
        for (name, spec) in &manifest.dependencies {
            entries.insert(
                name.clone(),
                DeclaredDep {
                    spec: spec.clone(),
                    section: DepSection::Dependencies,
                },
            );
        }
        Self { entries }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DeclaredDep> {
        self.entries.get(name)
    }

    /// Declared with a local spec.
    #[must_use]
    pub fn is_local(&self, name: &str) -> bool {
        self.get(name).is_some_and(DeclaredDep::is_local)
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a dependency spec points at a local directory.
#[must_use]
pub fn is_local_spec(spec: &str) -> bool {
    spec.starts_with("file:") || spec.starts_with("link:")
}

/// Read declared dependencies from a `package.json`.
///
/// # Errors
/// Returns `PkgError` if the file is missing or cannot be parsed.
pub fn read_declared_deps(package_json_path: &Path) -> Result<DeclaredDeps, PkgError> {
    if !package_json_path.is_file() {
        return Err(PkgError::package_json_not_found(package_json_path));
    }
    let manifest = PackageManifest::read(package_json_path)
        .map_err(|e| PkgError::package_json_invalid(e.message))?;
    Ok(DeclaredDeps::from_manifest(&manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_declared_deps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(
            &path,
            r#"{
                "dependencies": { "left-pad": "^1.3.0", "shared": "1.0.0" },
                "devDependencies": { "@tsci/local-board": "file:../board", "shared": "2.0.0" },
                "peerDependencies": { "react": "*" }
            }"#,
        )
        .unwrap();

        let deps = read_declared_deps(&path).unwrap();
        assert_eq!(deps.len(), 3);
        assert!(deps.contains("left-pad"));
        assert!(!deps.contains("react"));
        assert!(deps.is_local("@tsci/local-board"));
        assert!(!deps.is_local("left-pad"));

        let shared = deps.get("shared").unwrap();
        assert_eq!(shared.spec, "1.0.0");
        assert_eq!(shared.section, DepSection::Dependencies);

        let names: Vec<_> = deps.names().collect();
        assert_eq!(names, vec!["@tsci/local-board", "left-pad", "shared"]);
    }

    #[test]
    fn test_read_declared_deps_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_declared_deps(&dir.path().join("package.json")).unwrap_err();
        assert_eq!(err.code(), codes::PKG_PACKAGE_JSON_NOT_FOUND);
    }

    #[test]
    fn test_read_declared_deps_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, "[1, 2").unwrap();
        let err = read_declared_deps(&path).unwrap_err();
        assert_eq!(err.code(), codes::PKG_PACKAGE_JSON_INVALID);
    }

    #[test]
    fn test_is_local_spec() {
        assert!(is_local_spec("file:../lib"));
        assert!(is_local_spec("link:./packages/a"));
        assert!(!is_local_spec("^1.0.0"));
        assert!(!is_local_spec("workspace:*"));
    }
}
