//! Package resolution for the upload closure.
//!
//! Locates packages in `node_modules`, reads their manifests, and evaluates
//! `exports` to find the files an import actually loads.

mod exports;
mod manifest;
mod node_modules;
mod pkg_json_cache;

pub use exports::{
    resolve_entry_files, resolve_exports, resolve_target, TargetResolution, CONDITION_PRIORITY,
};
pub use manifest::{ExportsField, ExportsTarget, ManifestError, PackageManifest};
pub use node_modules::{
    find_package_root, is_bare_specifier, is_node_builtin, parse_bare_specifier, probe_entry,
    probe_file, LookupError, PackageNode, DEFAULT_EXTENSIONS,
};
pub use pkg_json_cache::{
    read_manifest_cached, CachedPkgJson, MemoryPkgJsonCache, PkgJsonCache, PkgJsonStamp,
};
