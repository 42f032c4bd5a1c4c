//! Upload closure: every file the renderer needs to resolve the project's imports.
//!
//! The walk starts at the entry file and at the project's declared
//! dependencies. Local files are followed through relative imports.
//! Packages must pass [`should_include`] before anything of theirs is
//! uploaded; problems are collected as [`ResolveWarning`]s and never abort
//! the pass.

mod upload;
mod walk;

pub use upload::{compute_upload_set, UploadSet};

use crate::error::Error;
use crate::pkg::{read_declared_deps, DeclaredDeps};
use crate::project::ProjectFile;
use crate::resolver::{MemoryPkgJsonCache, PackageNode};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Warning codes.
pub mod codes {
    pub const IMPORT_SCAN_FAILED: &str = "IMPORT_SCAN_FAILED";
    pub const IMPORT_NOT_RESOLVED: &str = "IMPORT_NOT_RESOLVED";
    pub const PACKAGE_NOT_FOUND: &str = "PACKAGE_NOT_FOUND";
    pub const MANIFEST_INVALID: &str = "MANIFEST_INVALID";
    pub const PACKAGE_NOT_DECLARED: &str = "PACKAGE_NOT_DECLARED";
    pub const SUBPATH_NOT_RESOLVED: &str = "SUBPATH_NOT_RESOLVED";
    pub const DANGLING_SYMLINK: &str = "DANGLING_SYMLINK";
    pub const FILE_UNREADABLE: &str = "FILE_UNREADABLE";
}

/// A non-fatal problem met while computing the closure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResolveWarning {
    /// Stable code from [`codes`].
    pub code: String,
    /// Project-relative path or package specifier the warning is about.
    pub path: String,
    pub message: String,
}

impl ResolveWarning {
    #[must_use]
    pub fn new(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// An included package and the files uploaded for it.
#[derive(Debug, Clone)]
pub struct PackageUpload {
    pub node: PackageNode,
    pub files: Vec<ProjectFile>,
}

/// Result of [`DependencyResolver::resolve_closure`].
#[derive(Debug, Clone, Default)]
pub struct UploadClosure {
    /// Project files reachable from the entry, in discovery order.
    pub local_files: Vec<ProjectFile>,
    /// Sorted by logical directory.
    pub packages: Vec<PackageUpload>,
    /// Sorted and deduplicated.
    pub warnings: Vec<ResolveWarning>,
}

impl UploadClosure {
    /// Local files first, then package files.
    pub fn files(&self) -> impl Iterator<Item = &ProjectFile> {
        self.local_files
            .iter()
            .chain(self.packages.iter().flat_map(|p| p.files.iter()))
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.local_files.len() + self.packages.iter().map(|p| p.files.len()).sum::<usize>()
    }

    #[must_use]
    pub fn package(&self, name: &str) -> Option<&PackageUpload> {
        self.packages.iter().find(|p| p.node.name == name)
    }
}

/// Whether a package belongs in the closure.
///
/// It does when declared by the project, when linked locally (`file:` or
/// `link:` spec, or a symlink in `node_modules`), or when an already
/// included package requires it.
#[must_use]
pub fn should_include(node: &PackageNode, declared: &DeclaredDeps, required_by_included: bool) -> bool {
    let is_declared = declared.contains(&node.name);
    let is_local = declared.is_local(&node.name) || node.is_symlink;
    is_declared || is_local || required_by_included
}

/// Computes upload closures for one project.
///
/// Parsed manifests are memoized for the lifetime of the resolver.
pub struct DependencyResolver {
    root: PathBuf,
    runtime_provided: HashSet<String>,
    cache: MemoryPkgJsonCache,
}

impl DependencyResolver {
    /// `project_root` is canonicalized; packages inside it are named
    /// relative to the canonical path.
    #[must_use]
    pub fn new(project_root: &Path, runtime_provided: &[String]) -> Self {
        let root = dunce::canonicalize(project_root).unwrap_or_else(|_| project_root.to_path_buf());
        Self {
            root,
            runtime_provided: runtime_provided.iter().cloned().collect(),
            cache: MemoryPkgJsonCache::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn cache(&self) -> &MemoryPkgJsonCache {
        &self.cache
    }

    /// Packages the renderer supplies itself are never uploaded.
    #[must_use]
    pub fn is_runtime_provided(&self, name: &str) -> bool {
        self.runtime_provided.contains(name)
    }

    /// Compute everything `entry` needs.
    ///
    /// # Errors
    /// Returns [`Error::EntryNotFound`] if `entry` is not a file. Every other
    /// problem is reported in [`UploadClosure::warnings`].
    pub fn resolve_closure(&self, entry: &Path) -> Result<UploadClosure, Error> {
        let entry = dunce::canonicalize(entry)
            .ok()
            .filter(|p| p.is_file())
            .ok_or_else(|| Error::EntryNotFound {
                path: entry.to_path_buf(),
            })?;

        let (declared, warnings) = self.declared_deps();
        Ok(walk::Walk::new(self, declared, warnings).run(entry))
    }

    fn declared_deps(&self) -> (DeclaredDeps, Vec<ResolveWarning>) {
        let manifest_path = self.root.join("package.json");
        if !manifest_path.is_file() {
            return (DeclaredDeps::default(), Vec::new());
        }
        match read_declared_deps(&manifest_path) {
            Ok(declared) => (declared, Vec::new()),
            Err(e) => (
                DeclaredDeps::default(),
                vec![ResolveWarning::new(
                    codes::MANIFEST_INVALID,
                    "package.json",
                    e.message().to_string(),
                )],
            ),
        }
    }
}
