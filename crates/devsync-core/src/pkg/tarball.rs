//! Tarball download and declaration extraction.

use super::error::PkgError;
use bytes::Bytes;
use devsync_util::fs::atomic_write;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;

/// Maximum tarball size (50 MB).
pub const MAX_TARBALL_SIZE: u64 = 50 * 1024 * 1024;

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Download a tarball from a URL.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_tarball(client: &Client, url: &str, max_bytes: u64) -> Result<Bytes, PkgError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

    if !response.status().is_success() {
        return Err(PkgError::download_failed(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::download_failed(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PkgError::download_failed(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Whether a package-relative tarball path is kept by [`extract_type_declarations`].
fn is_declaration_entry(relative: &Path) -> bool {
    if relative == Path::new("package.json") {
        return true;
    }
    relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".d.ts") || n.ends_with(".d.mts") || n.ends_with(".d.cts"))
}

/// Strip the tarball's single top-level directory (`package/`, or the bare
/// name for some `@types/*` packages) and reject unsafe paths.
fn package_relative(path: &Path) -> Result<Option<PathBuf>, PkgError> {
    if path.is_absolute() {
        return Err(PkgError::extract_failed(format!(
            "Tarball contains absolute path: {}",
            path.display()
        )));
    }

    let mut components = path.components();
    components.next();
    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "Tarball contains path traversal: {}",
                    path.display()
                )));
            }
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

/// Extract only `package.json` and `*.d.ts` files of a package tarball into `dest`.
///
/// Existing files are overwritten; nothing else in `dest` is touched.
/// Returns the number of files written.
///
/// # Errors
/// Returns an error if the tarball is invalid or a file cannot be written.
pub fn extract_type_declarations(bytes: &[u8], dest: &Path) -> Result<usize, PkgError> {
    let gz = GzDecoder::new(bytes);
    let mut archive = Archive::new(gz);
    let mut written = 0;

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;

        // Symlinks and other special entries are skipped
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(relative) = package_relative(&path)? else {
            continue;
        };
        if !is_declaration_entry(&relative) {
            continue;
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| PkgError::extract_failed(format!("Failed to read {}: {e}", path.display())))?;
        atomic_write(&dest.join(&relative), &content)?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tar::Builder;
    use tempfile::tempdir;

    /// Build a gzipped tarball from `(path, contents)` pairs.
    pub(crate) fn build_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            for (path, data) in files {
                let mut header = tar::Header::new_gnu();
                header.set_path(path).unwrap();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
            builder.finish().unwrap();
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_extracts_only_declarations() {
        let tgz = build_tarball(&[
            ("package/package.json", br#"{"name":"@tsci/led","types":"dist/index.d.ts"}"#),
            ("package/dist/index.js", b"export const Led = 1;"),
            ("package/dist/index.d.ts", b"export declare const Led: number;"),
            ("package/dist/util.d.mts", b"export {};"),
            ("package/README.md", b"# led"),
        ]);

        let dir = tempdir().unwrap();
        let dest = dir.path().join("node_modules/@tsci/led");
        let written = extract_type_declarations(&tgz, &dest).unwrap();

        assert_eq!(written, 3);
        assert!(dest.join("package.json").is_file());
        assert!(dest.join("dist/index.d.ts").is_file());
        assert!(dest.join("dist/util.d.mts").is_file());
        assert!(!dest.join("dist/index.js").exists());
        assert!(!dest.join("README.md").exists());
    }

    #[test]
    fn test_non_package_prefix() {
        let tgz = build_tarball(&[("node/index.d.ts", b"declare module 'x';")]);
        let dir = tempdir().unwrap();
        let written = extract_type_declarations(&tgz, dir.path()).unwrap();
        assert_eq!(written, 1);
        assert!(dir.path().join("index.d.ts").is_file());
    }

    #[test]
    fn test_nested_package_json_is_not_extracted() {
        let tgz = build_tarball(&[("package/fixtures/package.json", b"{}")]);
        let dir = tempdir().unwrap();
        assert_eq!(extract_type_declarations(&tgz, dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_overwrites_existing_declaration() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.d.ts"), "old").unwrap();
        let tgz = build_tarball(&[("package/index.d.ts", b"new")]);
        extract_type_declarations(&tgz, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("index.d.ts")).unwrap(), "new");
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(package_relative(Path::new("package/../../evil.d.ts")).is_err());
        assert!(package_relative(Path::new("package/a/./b.d.ts")).unwrap().is_some());
        assert!(package_relative(Path::new("package")).unwrap().is_none());
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = tempdir().unwrap();
        assert!(extract_type_declarations(b"not a tarball", dir.path()).is_err());
    }
}
