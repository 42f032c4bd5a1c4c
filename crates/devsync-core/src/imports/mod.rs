//! Import discovery for JavaScript/TypeScript files.
//!
//! Provides a lexical scanner to detect import/require specifiers.

mod scan;

pub use scan::{resolve_imports, scan_imports, ImportKind, ImportSpec, ScanError};
