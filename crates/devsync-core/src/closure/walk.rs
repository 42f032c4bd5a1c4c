//! Worklist traversal behind [`DependencyResolver::resolve_closure`].
//!
//! [`DependencyResolver::resolve_closure`]: super::DependencyResolver::resolve_closure

use super::{codes, compute_upload_set, should_include, DependencyResolver};
use super::{PackageUpload, ResolveWarning, UploadClosure};
use crate::imports::resolve_imports;
use crate::pkg::DeclaredDeps;
use crate::project::ProjectFile;
use crate::resolver::{
    find_package_root, is_bare_specifier, is_node_builtin, parse_bare_specifier, probe_entry,
    probe_file, resolve_entry_files, LookupError, PackageNode,
};
use devsync_util::fs::{normalize_path, to_posix_path};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Extensions whose contents are scanned for imports.
const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e))
}

fn is_relative_specifier(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

fn display_specifier(name: &str, subpath: &str) -> String {
    match subpath.strip_prefix('.') {
        Some(rest) => format!("{name}{rest}"),
        None => format!("{name}/{subpath}"),
    }
}

struct PackageRequest {
    name: String,
    /// `None` for dependency edges that import nothing in particular.
    subpath: Option<String>,
    from_dir: PathBuf,
    /// Lookup retried from here when `from_dir` finds nothing. Linked
    /// packages living outside the project rely on the project's hoisted
    /// `node_modules`.
    fallback_dir: Option<PathBuf>,
    required_by_included: bool,
    /// Peer and optional dependencies: a missing package is not reported.
    optional: bool,
}

struct PackageState {
    node: PackageNode,
    included: bool,
    /// Subpaths requested before the package passed the gate.
    pending_subpaths: Vec<String>,
    /// Real paths of imported files, for packages without a manifest.
    imported_files: BTreeSet<PathBuf>,
}

impl PackageState {
    fn new(node: PackageNode) -> Self {
        Self {
            node,
            included: false,
            pending_subpaths: Vec::new(),
            imported_files: BTreeSet::new(),
        }
    }
}

pub(super) struct Walk<'r> {
    resolver: &'r DependencyResolver,
    declared: DeclaredDeps,
    warnings: Vec<ResolveWarning>,
    local_files: Vec<ProjectFile>,
    local_seen: HashSet<PathBuf>,
    local_queue: VecDeque<PathBuf>,
    package_file_queue: VecDeque<(PathBuf, PathBuf)>,
    package_queue: VecDeque<PackageRequest>,
    /// Keyed by real directory so a package reached twice is one node.
    packages: BTreeMap<PathBuf, PackageState>,
    /// Gate rejections: name to logical directory.
    rejected: BTreeMap<String, String>,
    reported: HashSet<String>,
}

impl<'r> Walk<'r> {
    pub(super) fn new(
        resolver: &'r DependencyResolver,
        declared: DeclaredDeps,
        warnings: Vec<ResolveWarning>,
    ) -> Self {
        Self {
            resolver,
            declared,
            warnings,
            local_files: Vec::new(),
            local_seen: HashSet::new(),
            local_queue: VecDeque::new(),
            package_file_queue: VecDeque::new(),
            package_queue: VecDeque::new(),
            packages: BTreeMap::new(),
            rejected: BTreeMap::new(),
            reported: HashSet::new(),
        }
    }

    pub(super) fn run(mut self, entry: PathBuf) -> UploadClosure {
        let root = self.resolver.root().to_path_buf();
        let seeds: Vec<String> = self.declared.names().map(str::to_string).collect();
        for name in seeds {
            self.package_queue.push_back(PackageRequest {
                name,
                subpath: None,
                from_dir: root.clone(),
                fallback_dir: None,
                required_by_included: false,
                optional: false,
            });
        }

        self.enqueue_local(entry);

        loop {
            if let Some(file) = self.local_queue.pop_front() {
                self.visit_local(&file);
            } else if let Some((key, file)) = self.package_file_queue.pop_front() {
                self.visit_package_file(&key, &file);
            } else if let Some(request) = self.package_queue.pop_front() {
                self.visit_package(request);
            } else {
                break;
            }
        }

        self.finish()
    }

    fn warn(&mut self, code: &str, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ResolveWarning::new(code, path, message));
    }

    fn enqueue_local(&mut self, path: PathBuf) {
        let key = dunce::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if self.local_seen.insert(key) {
            self.local_queue.push_back(path);
        }
    }

    fn visit_local(&mut self, file: &Path) {
        let resolver = self.resolver;
        let root = resolver.root();
        let Some(logical) = file.strip_prefix(root).ok().and_then(to_posix_path) else {
            self.warn(
                codes::IMPORT_NOT_RESOLVED,
                file.display().to_string(),
                "file is outside the project root",
            );
            return;
        };

        let project_file = match ProjectFile::load(file, logical.clone()) {
            Ok(f) => f,
            Err(e) => {
                self.warn(codes::FILE_UNREADABLE, logical, e.to_string());
                return;
            }
        };

        if is_script(file) {
            if let Some(text) = project_file.content.as_text() {
                match resolve_imports(text) {
                    Ok(specifiers) => {
                        let dir = file.parent().unwrap_or(root).to_path_buf();
                        for spec in specifiers {
                            self.follow_local_import(&logical, &dir, &spec);
                        }
                    }
                    Err(e) => self.warn(codes::IMPORT_SCAN_FAILED, logical.clone(), e.to_string()),
                }
            }
        }

        self.local_files.push(project_file);
    }

    fn follow_local_import(&mut self, importer: &str, dir: &Path, spec: &str) {
        if is_relative_specifier(spec) {
            let resolver = self.resolver;
            let root = resolver.root();
            match probe_file(&normalize_path(&dir.join(spec))) {
                Some(found) if found.starts_with(root) => self.enqueue_local(found),
                Some(_) => self.warn(
                    codes::IMPORT_NOT_RESOLVED,
                    importer,
                    format!("`{spec}` resolves outside the project root"),
                ),
                None => self.warn(
                    codes::IMPORT_NOT_RESOLVED,
                    importer,
                    format!("cannot resolve `{spec}`"),
                ),
            }
            return;
        }

        if !is_bare_specifier(spec) {
            return;
        }
        let Some((name, subpath)) = parse_bare_specifier(spec) else {
            return;
        };
        if self.resolver.is_runtime_provided(name) {
            return;
        }
        self.package_queue.push_back(PackageRequest {
            name: name.to_string(),
            subpath: Some(subpath),
            from_dir: dir.to_path_buf(),
            fallback_dir: None,
            required_by_included: false,
            optional: false,
        });
    }

    fn visit_package(&mut self, request: PackageRequest) {
        if self.resolver.is_runtime_provided(&request.name) {
            return;
        }

        let resolver = self.resolver;
        let root = resolver.root();
        let cache = resolver.cache();
        let mut lookup = find_package_root(&request.name, &request.from_dir, root, cache);
        if matches!(lookup, Err(LookupError::NotFound { .. })) {
            if let Some(fallback) = &request.fallback_dir {
                lookup = find_package_root(&request.name, fallback, root, cache);
            }
        }

        let node = match lookup {
            Ok(node) => node,
            Err(LookupError::NotFound { .. }) => {
                let silent = request.optional || is_node_builtin(&request.name);
                if !silent && self.reported.insert(request.name.clone()) {
                    let message = format!("package `{}` is not installed", request.name);
                    self.warn(codes::PACKAGE_NOT_FOUND, request.name, message);
                }
                return;
            }
            Err(err @ LookupError::InvalidManifest { .. }) => {
                if self.reported.insert(request.name.clone()) {
                    self.warn(codes::MANIFEST_INVALID, request.name, err.to_string());
                }
                return;
            }
        };

        let key = node.real_directory.clone();
        let state = self
            .packages
            .entry(key.clone())
            .or_insert_with(|| PackageState::new(node));
        if let Some(subpath) = request.subpath {
            state.pending_subpaths.push(subpath);
        }

        let newly_included = !state.included;
        if newly_included {
            if !should_include(&state.node, &self.declared, request.required_by_included) {
                self.rejected
                    .entry(state.node.name.clone())
                    .or_insert_with(|| state.node.logical_directory.clone());
                return;
            }
            state.included = true;
        }
        let pending = std::mem::take(&mut state.pending_subpaths);

        if newly_included {
            self.enqueue_dependencies(&key);
        }
        for subpath in pending {
            self.resolve_subpath(&key, &subpath);
        }
    }

    fn enqueue_dependencies(&mut self, key: &Path) {
        let Some(state) = self.packages.get(key) else {
            return;
        };
        let Some(manifest) = state.node.manifest.clone() else {
            return;
        };
        let from_dir = state.node.real_directory.clone();
        let fallback_dir = Some(self.resolver.root().join(&state.node.logical_directory));

        let required = manifest.dependencies.keys().map(|name| (name, false));
        let optional = manifest
            .peer_dependencies
            .keys()
            .chain(manifest.optional_dependencies.keys())
            .map(|name| (name, true));

        for (name, optional) in required.chain(optional) {
            self.package_queue.push_back(PackageRequest {
                name: name.clone(),
                subpath: None,
                from_dir: from_dir.clone(),
                fallback_dir: fallback_dir.clone(),
                required_by_included: true,
                optional,
            });
        }
    }

    fn resolve_subpath(&mut self, key: &Path, subpath: &str) {
        let Some(state) = self.packages.get_mut(key) else {
            return;
        };

        let candidates = resolve_entry_files(state.node.manifest.as_deref(), subpath);
        let found = probe_entry(&state.node.real_directory, &candidates)
            .map(|p| normalize_path(&p))
            .filter(|p| p.starts_with(&state.node.real_directory));

        let Some(found) = found else {
            let shown = display_specifier(&state.node.name, subpath);
            let message = format!("no file for `{shown}` in {}", state.node.logical_directory);
            self.warn(codes::SUBPATH_NOT_RESOLVED, shown, message);
            return;
        };

        if let Some(relative) = found
            .strip_prefix(&state.node.real_directory)
            .ok()
            .and_then(to_posix_path)
        {
            if !state.node.resolved_entry_paths.contains(&relative) {
                state.node.resolved_entry_paths.push(relative);
            }
        }

        if state.node.manifest.is_none() && state.imported_files.insert(found.clone()) {
            self.package_file_queue.push_back((key.to_path_buf(), found));
        }
    }

    /// Follow the imports of a file inside a manifestless package.
    fn visit_package_file(&mut self, key: &Path, file: &Path) {
        if !is_script(file) {
            return;
        }
        let Some(state) = self.packages.get(key) else {
            return;
        };
        let real_dir = state.node.real_directory.clone();
        let fallback_dir = self.resolver.root().join(&state.node.logical_directory);
        let label = state
            .node
            .logical_path_of(file)
            .unwrap_or_else(|| file.display().to_string());

        // Unreadable files are reported when the upload set is loaded.
        let Ok(text) = std::fs::read_to_string(file) else {
            return;
        };
        let specifiers = match resolve_imports(&text) {
            Ok(specifiers) => specifiers,
            Err(e) => {
                self.warn(codes::IMPORT_SCAN_FAILED, label, e.to_string());
                return;
            }
        };

        let dir = file.parent().unwrap_or(&real_dir).to_path_buf();
        for spec in specifiers {
            if is_relative_specifier(&spec) {
                let found = probe_file(&normalize_path(&dir.join(&spec)))
                    .filter(|p| p.starts_with(&real_dir));
                let Some(found) = found else {
                    self.warn(
                        codes::IMPORT_NOT_RESOLVED,
                        label.clone(),
                        format!("cannot resolve `{spec}` inside the package"),
                    );
                    continue;
                };
                if let Some(state) = self.packages.get_mut(key) {
                    if state.imported_files.insert(found.clone()) {
                        self.package_file_queue.push_back((key.to_path_buf(), found));
                    }
                }
            } else if is_bare_specifier(&spec) {
                let Some((name, subpath)) = parse_bare_specifier(&spec) else {
                    continue;
                };
                self.package_queue.push_back(PackageRequest {
                    name: name.to_string(),
                    subpath: Some(subpath),
                    from_dir: dir.clone(),
                    fallback_dir: Some(fallback_dir.clone()),
                    required_by_included: true,
                    optional: false,
                });
            }
        }
    }

    fn finish(mut self) -> UploadClosure {
        let included: HashSet<String> = self
            .packages
            .values()
            .filter(|s| s.included)
            .map(|s| s.node.name.clone())
            .collect();
        for (name, logical) in std::mem::take(&mut self.rejected) {
            if !included.contains(&name) {
                self.warn(
                    codes::PACKAGE_NOT_DECLARED,
                    logical,
                    format!("`{name}` is imported but not declared in package.json"),
                );
            }
        }

        let mut packages = Vec::new();
        for state in std::mem::take(&mut self.packages).into_values() {
            if !state.included {
                continue;
            }
            let imported: Vec<PathBuf> = state.imported_files.into_iter().collect();
            let set = compute_upload_set(&state.node, &imported);
            self.warnings.extend(set.warnings);
            packages.push(PackageUpload {
                node: state.node,
                files: set.files,
            });
        }
        packages.sort_by(|a, b| a.node.logical_directory.cmp(&b.node.logical_directory));

        self.warnings.sort();
        self.warnings.dedup();

        UploadClosure {
            local_files: self.local_files,
            packages,
            warnings: self.warnings,
        }
    }
}
