pub mod closure;
pub mod dev;
pub mod version;

use devsync_core::paths::{find_entry, project_root};
use devsync_core::{load_sync_config, SyncConfig};
use miette::{miette, IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

/// A project located from the working directory.
pub(crate) struct Project {
    pub root: PathBuf,
    pub entry: PathBuf,
    pub config: SyncConfig,
}

/// Find the project root above `cwd`, load its config, and pick the entry.
///
/// An entry given on the command line is relative to `cwd`; one from the
/// config file is relative to the root.
pub(crate) fn locate_project(cwd: &Path, explicit_entry: Option<&Path>) -> Result<Project> {
    let root = project_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    let config = load_sync_config(&root).into_diagnostic()?;

    let explicit = explicit_entry
        .map(|entry| cwd.join(entry))
        .or_else(|| config.entry.as_ref().map(|entry| root.join(entry)));

    let entry = find_entry(&root, explicit.as_deref()).ok_or_else(|| match &explicit {
        Some(path) => miette!("entry file not found: {}", path.display()),
        None => miette!(
            "no entry file in {} (expected one of index.tsx, index.ts, index.circuit.tsx, index.jsx, index.js)",
            root.display()
        ),
    })?;

    Ok(Project {
        root,
        entry,
        config,
    })
}
