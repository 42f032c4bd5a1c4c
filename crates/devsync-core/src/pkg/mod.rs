//! Package metadata and type-declaration fetching.
//!
//! Provides utilities for:
//! - Reading the project's declared dependencies
//! - Fetching package metadata from the npm registry
//! - Downloading tarballs and extracting their `.d.ts` files

pub mod deps;
pub mod error;
pub mod registry;
pub mod tarball;
pub mod types;

pub use deps::{is_local_spec, read_declared_deps, DeclaredDep, DeclaredDeps, DepSection};
pub use error::{codes as pkg_codes, PkgError};
pub use registry::{get_latest_version, get_tarball_url, RegistryClient};
pub use tarball::{download_tarball, extract_type_declarations, MAX_TARBALL_SIZE};
pub use types::{
    fetch_type_declarations, has_type_declarations, scoped_package_names, type_check_specifiers,
    TypeCheckOutcome, TypeFetcher,
};
