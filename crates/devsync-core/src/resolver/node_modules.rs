//! `node_modules` lookup and file probing.
//!
//! A package found through a symlink has two locations: the real directory
//! its bytes are read from, and the logical project-relative directory the
//! renderer's imports will name.

use super::manifest::{ManifestError, PackageManifest};
use super::pkg_json_cache::{read_manifest_cached, PkgJsonCache};
use devsync_util::fs::to_posix_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions probed for extensionless specifiers, in order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".tsx", ".ts", ".jsx", ".js", ".mjs", ".cjs", ".json"];

/// Node built-in modules that never live in `node_modules`.
const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "net",
    "os", "path", "process", "stream", "url", "util", "zlib",
];

/// An installed package as seen by the resolver.
#[derive(Debug, Clone)]
pub struct PackageNode {
    pub name: String,
    /// Symlinks resolved.
    pub real_directory: PathBuf,
    /// Project-relative POSIX path, e.g. `node_modules/@scope/pkg`.
    pub logical_directory: String,
    pub manifest: Option<Arc<PackageManifest>>,
    /// Package-relative files the imports of this package resolved to.
    pub resolved_entry_paths: Vec<String>,
    /// `node_modules/<name>` is itself a symlink.
    pub is_symlink: bool,
}

impl PackageNode {
    /// Project-relative upload path of a file under `real_directory`.
    #[must_use]
    pub fn logical_path_of(&self, real_file: &Path) -> Option<String> {
        let relative = real_file.strip_prefix(&self.real_directory).ok()?;
        let relative = to_posix_path(relative)?;
        Some(format!("{}/{relative}", self.logical_directory))
    }
}

/// Why a package lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("package '{name}' not found in any node_modules above {from}")]
    NotFound { name: String, from: PathBuf },

    #[error("package '{name}' has an unreadable manifest: {source}")]
    InvalidManifest {
        name: String,
        manifest_path: PathBuf,
        #[source]
        source: ManifestError,
    },
}

/// Whether a specifier names a package rather than a file.
#[must_use]
pub fn is_bare_specifier(spec: &str) -> bool {
    !spec.is_empty()
        && !spec.starts_with('.')
        && !spec.starts_with('/')
        && !spec.starts_with('#')
        && !spec.contains(':')
}

/// Whether a bare name refers to a Node built-in.
#[must_use]
pub fn is_node_builtin(name: &str) -> bool {
    NODE_BUILTINS.contains(&name)
}

/// Split a bare specifier into package name and exports-style subpath.
///
/// `"lodash/fp"` gives `("lodash", "./fp")`, `"@scope/pkg"` gives
/// `("@scope/pkg", ".")`.
#[must_use]
pub fn parse_bare_specifier(spec: &str) -> Option<(&str, String)> {
    let split_at = if spec.starts_with('@') {
        let first = spec.find('/')?;
        if first + 1 == spec.len() {
            return None;
        }
        spec[first + 1..].find('/').map(|i| first + 1 + i)
    } else {
        spec.find('/')
    };

    match split_at {
        Some(i) => {
            let rest = &spec[i + 1..];
            if rest.is_empty() {
                Some((&spec[..i], ".".to_string()))
            } else {
                Some((&spec[..i], format!("./{rest}")))
            }
        }
        None => Some((spec, ".".to_string())),
    }
}

/// Locate a package by walking `node_modules` directories upward from `from_dir`.
///
/// `project_root` must be canonical. Packages outside it get the
/// conventional logical directory `node_modules/<name>`.
pub fn find_package_root(
    name: &str,
    from_dir: &Path,
    project_root: &Path,
    cache: &dyn PkgJsonCache,
) -> Result<PackageNode, LookupError> {
    let mut current = Some(from_dir);

    while let Some(dir) = current {
        let candidate = dir.join("node_modules").join(name);
        if candidate.is_dir() {
            return load_package_node(name, &candidate, project_root, cache);
        }
        current = dir.parent();
    }

    Err(LookupError::NotFound {
        name: name.to_string(),
        from: from_dir.to_path_buf(),
    })
}

fn load_package_node(
    name: &str,
    pkg_dir: &Path,
    project_root: &Path,
    cache: &dyn PkgJsonCache,
) -> Result<PackageNode, LookupError> {
    let is_symlink = std::fs::symlink_metadata(pkg_dir)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let real_directory = dunce::canonicalize(pkg_dir).unwrap_or_else(|_| pkg_dir.to_path_buf());

    let logical_directory = pkg_dir
        .strip_prefix(project_root)
        .ok()
        .and_then(to_posix_path)
        .unwrap_or_else(|| format!("node_modules/{name}"));

    let manifest_path = real_directory.join("package.json");
    let manifest = if manifest_path.is_file() {
        let manifest = read_manifest_cached(&manifest_path, cache).map_err(|source| {
            LookupError::InvalidManifest {
                name: name.to_string(),
                manifest_path: manifest_path.clone(),
                source,
            }
        })?;
        Some(manifest)
    } else {
        None
    };

    Ok(PackageNode {
        name: name.to_string(),
        real_directory,
        logical_directory,
        manifest,
        resolved_entry_paths: Vec::new(),
        is_symlink,
    })
}

/// Resolve a path to a file: exact, then with each extension appended,
/// then `index.*` inside it as a directory.
#[must_use]
pub fn probe_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }

    let file_name = base.file_name()?.to_string_lossy().into_owned();
    for ext in DEFAULT_EXTENSIONS {
        let with_ext = base.with_file_name(format!("{file_name}{ext}"));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    if base.is_dir() {
        for ext in DEFAULT_EXTENSIONS {
            let index = base.join(format!("index{ext}"));
            if index.is_file() {
                return Some(index);
            }
        }
    }

    None
}

/// First candidate entry that exists on disk under `package_dir`.
#[must_use]
pub fn probe_entry(package_dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .find_map(|candidate| probe_file(&package_dir.join(candidate)))
}
