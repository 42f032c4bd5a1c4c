//! Files uploaded for a single package.

use super::{codes, ResolveWarning};
use crate::paths::ALWAYS_IGNORED_DIRS;
use crate::project::ProjectFile;
use crate::resolver::PackageNode;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Files of one package plus the problems met collecting them.
#[derive(Debug, Clone, Default)]
pub struct UploadSet {
    pub files: Vec<ProjectFile>,
    pub warnings: Vec<ResolveWarning>,
}

/// Collect the files of `node` for upload, named by its logical directory.
///
/// A package with a manifest uploads its whole tree except nested
/// `node_modules`. A manifestless package uploads `imported_files` only.
#[must_use]
pub fn compute_upload_set(node: &PackageNode, imported_files: &[PathBuf]) -> UploadSet {
    if node.manifest.is_some() {
        enumerate_package(node)
    } else {
        load_imported(node, imported_files)
    }
}

fn enumerate_package(node: &PackageNode) -> UploadSet {
    let mut set = UploadSet::default();

    let walker = WalkDir::new(&node.real_directory)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !ALWAYS_IGNORED_DIRS.contains(&name.as_ref())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                set.warnings.push(walk_warning(node, &err));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(logical) = node.logical_path_of(entry.path()) else {
            continue;
        };
        push_file(&mut set, entry.path(), logical);
    }

    set
}

fn load_imported(node: &PackageNode, imported_files: &[PathBuf]) -> UploadSet {
    let mut set = UploadSet::default();
    for file in imported_files {
        if let Some(logical) = node.logical_path_of(file) {
            push_file(&mut set, file, logical);
        }
    }
    set.files.sort_by(|a, b| a.path.cmp(&b.path));
    set.files.dedup_by(|a, b| a.path == b.path);
    set
}

fn push_file(set: &mut UploadSet, real_path: &std::path::Path, logical: String) {
    match ProjectFile::load(real_path, logical.clone()) {
        Ok(file) => set.files.push(file),
        Err(e) => set
            .warnings
            .push(ResolveWarning::new(codes::FILE_UNREADABLE, logical, e.to_string())),
    }
}

fn walk_warning(node: &PackageNode, err: &walkdir::Error) -> ResolveWarning {
    let path = err
        .path()
        .and_then(|p| node.logical_path_of(p))
        .unwrap_or_else(|| node.logical_directory.clone());

    let dangling = err
        .io_error()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound);
    if dangling {
        ResolveWarning::new(codes::DANGLING_SYMLINK, path, "symlink target does not exist")
    } else {
        ResolveWarning::new(codes::FILE_UNREADABLE, path, err.to_string())
    }
}
