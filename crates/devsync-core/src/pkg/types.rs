//! Type-declaration availability for scoped imports.
//!
//! The renderer's editor needs `.d.ts` files for `@scope/name` imports.
//! When a package installed under `node_modules` has none, the latest
//! published declarations can be fetched from the registry.

use super::error::PkgError;
use super::registry::{get_latest_version, get_tarball_url, RegistryClient};
use super::tarball::{download_tarball, extract_type_declarations, MAX_TARBALL_SIZE};
use crate::imports::scan_imports;
use crate::resolver::{is_bare_specifier, parse_bare_specifier, PackageManifest};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Mutex;
use walkdir::WalkDir;

/// Scoped package names referenced by a list of import specifiers.
#[must_use]
pub fn scoped_package_names(specifiers: &[String]) -> BTreeSet<String> {
    specifiers
        .iter()
        .filter(|s| s.starts_with('@') && is_bare_specifier(s))
        .filter_map(|s| parse_bare_specifier(s).map(|(name, _)| name.to_string()))
        .collect()
}

/// Specifiers whose packages the editor needs declarations for.
///
/// Unlike the upload closure this keeps `import type` clauses, since those
/// exist only for the type checker. A source that fails to scan yields none.
#[must_use]
pub fn type_check_specifiers(source: &str) -> Vec<String> {
    scan_imports(source)
        .map(|specs| specs.into_iter().map(|spec| spec.specifier).collect())
        .unwrap_or_default()
}

/// Whether a package directory carries any type declaration.
///
/// Checked in order: the manifest `types`/`typings` target, `index.d.ts`,
/// then any `.d.ts` file outside nested `node_modules`.
#[must_use]
pub fn has_type_declarations(package_dir: &Path) -> bool {
    if !package_dir.is_dir() {
        return false;
    }

    if let Ok(manifest) = PackageManifest::read(&package_dir.join("package.json")) {
        if let Some(types) = manifest.types_entry() {
            if package_dir.join(types.trim_start_matches("./")).is_file() {
                return true;
            }
        }
    }

    if package_dir.join("index.d.ts").is_file() {
        return true;
    }

    WalkDir::new(package_dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != "node_modules")
        .filter_map(Result::ok)
        .any(|e| {
            e.file_type().is_file() && e.file_name().to_string_lossy().ends_with(".d.ts")
        })
}

/// Download the latest declarations of `name` into `package_dir`.
///
/// Returns the number of files written.
///
/// # Errors
/// Returns an error if the registry lookup, download, or extraction fails,
/// or if the published tarball has no declarations.
pub async fn fetch_type_declarations(
    client: &RegistryClient,
    name: &str,
    package_dir: &Path,
) -> Result<usize, PkgError> {
    let packument = client.fetch_packument(name).await?;
    let version = get_latest_version(&packument)
        .ok_or_else(|| PkgError::registry(format!("No latest version published for {name}")))?;
    let tarball_url = get_tarball_url(&packument, version)
        .ok_or_else(|| PkgError::registry(format!("No tarball for {name}@{version}")))?;

    let bytes = download_tarball(client.http(), tarball_url, MAX_TARBALL_SIZE).await?;
    let written = extract_type_declarations(&bytes, package_dir)?;

    if has_type_declarations(package_dir) {
        Ok(written)
    } else {
        Err(PkgError::types_not_found(name))
    }
}

/// Result of checking one scoped import.
#[derive(Debug)]
pub enum TypeCheckOutcome {
    /// Declarations were fetched; holds the number of files written.
    Fetched { name: String, files: usize },
    Failed { name: String, error: PkgError },
}

/// Runs the availability check, fetching each package at most once per session.
#[derive(Debug)]
pub struct TypeFetcher {
    client: RegistryClient,
    attempted: Mutex<HashSet<String>>,
}

impl TypeFetcher {
    #[must_use]
    pub fn new(client: RegistryClient) -> Self {
        Self {
            client,
            attempted: Mutex::new(HashSet::new()),
        }
    }

    /// Check every scoped import of a file about to be uploaded.
    ///
    /// Packages that already have declarations, or were already attempted,
    /// produce no outcome.
    pub async fn ensure_types(
        &self,
        project_root: &Path,
        specifiers: &[String],
    ) -> Vec<TypeCheckOutcome> {
        let mut outcomes = Vec::new();

        for name in scoped_package_names(specifiers) {
            let package_dir = project_root.join("node_modules").join(&name);
            if has_type_declarations(&package_dir) {
                continue;
            }
            let first_attempt = self
                .attempted
                .lock()
                .map(|mut set| set.insert(name.clone()))
                .unwrap_or(false);
            if !first_attempt {
                continue;
            }

            match fetch_type_declarations(&self.client, &name, &package_dir).await {
                Ok(files) => outcomes.push(TypeCheckOutcome::Fetched { name, files }),
                Err(error) => outcomes.push(TypeCheckOutcome::Failed { name, error }),
            }
        }

        outcomes
    }
}
