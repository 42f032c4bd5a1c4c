//! Package.json parse cache.
//!
//! Parsed manifests are cached with mtime/size stamps so an edit to a
//! `package.json` between runs is picked up.

use super::manifest::{ManifestError, PackageManifest};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// File stamp for cache invalidation.
#[derive(Debug, Clone, Default)]
pub struct PkgJsonStamp {
    /// Modification time in milliseconds since epoch.
    pub mtime_ms: Option<u64>,
    /// File size in bytes.
    pub size: Option<u64>,
}

impl PkgJsonStamp {
    /// Create stamp from a path by reading its metadata.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_path(path: &Path) -> Self {
        if let Ok(meta) = path.metadata() {
            let mtime_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);
            Self {
                mtime_ms,
                size: Some(meta.len()),
            }
        } else {
            Self::default()
        }
    }

    /// Check if the stamp matches the current file state.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(meta) = path.metadata() else {
            return false;
        };

        // Check mtime
        if let Some(expected_mtime) = self.mtime_ms {
            let current_mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64);
            if current_mtime != Some(expected_mtime) {
                return false;
            }
        }

        // Check size
        if let Some(expected_size) = self.size {
            if meta.len() != expected_size {
                return false;
            }
        }

        true
    }
}

/// Cached package.json entry.
#[derive(Debug, Clone)]
pub struct CachedPkgJson {
    /// The parsed manifest.
    pub manifest: Arc<PackageManifest>,
    /// File stamp for invalidation.
    pub stamp: PkgJsonStamp,
}

/// Trait for caching parsed package.json files.
///
/// Implementations should be thread-safe (Send + Sync).
pub trait PkgJsonCache: Send + Sync + std::fmt::Debug {
    /// Look up a cached manifest by path.
    ///
    /// Returns None if not cached or if the stamp is invalid.
    fn get(&self, path: &Path) -> Option<Arc<PackageManifest>>;

    /// Store a parsed manifest in the cache.
    fn set(&self, path: &Path, manifest: Arc<PackageManifest>);
}

/// In-memory cache scoped to one resolver run.
#[derive(Debug, Default)]
pub struct MemoryPkgJsonCache {
    entries: Mutex<HashMap<PathBuf, CachedPkgJson>>,
}

impl MemoryPkgJsonCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PkgJsonCache for MemoryPkgJsonCache {
    fn get(&self, path: &Path) -> Option<Arc<PackageManifest>> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(path)?;
        cached
            .stamp
            .matches(path)
            .then(|| Arc::clone(&cached.manifest))
    }

    fn set(&self, path: &Path, manifest: Arc<PackageManifest>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                path.to_path_buf(),
                CachedPkgJson {
                    manifest,
                    stamp: PkgJsonStamp::from_path(path),
                },
            );
        }
    }
}

/// Read and parse a manifest, consulting `cache` first.
pub fn read_manifest_cached(
    path: &Path,
    cache: &dyn PkgJsonCache,
) -> Result<Arc<PackageManifest>, ManifestError> {
    if let Some(manifest) = cache.get(path) {
        return Ok(manifest);
    }
    let manifest = Arc::new(PackageManifest::read(path)?);
    cache.set(path, Arc::clone(&manifest));
    Ok(manifest)
}
