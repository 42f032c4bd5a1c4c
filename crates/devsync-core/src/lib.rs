#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod classify;
pub mod closure;
pub mod config;
pub mod error;
pub mod imports;
pub mod paths;
pub mod pkg;
pub mod project;
pub mod resolver;
pub mod version;

pub use classify::{classify, FileKind};
pub use closure::{
    codes as closure_codes, compute_upload_set, should_include, DependencyResolver,
    PackageUpload, ResolveWarning, UploadClosure, UploadSet,
};
pub use config::{load_sync_config, Config, SyncConfig};
pub use error::Error;
pub use imports::{resolve_imports, scan_imports, ImportKind, ImportSpec, ScanError};
pub use project::{list_project_files, to_upload_payload, FileContent, LocalFile, ProjectFile};
pub use resolver::{find_package_root, resolve_entry_files, PackageManifest, PackageNode};
pub use version::VERSION;
