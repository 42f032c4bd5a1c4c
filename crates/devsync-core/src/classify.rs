//! Text/binary classification of project files.

use std::path::Path;

/// Extensions always treated as binary: 3D models, images, archives,
/// fonts, documents, and WebAssembly.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "glb", "stl", "3mf", "fbx", "step", "stp", "wrl", "png", "jpg", "jpeg", "gif", "webp",
    "bmp", "ico", "avif", "zip", "gz", "tgz", "tar", "7z", "rar", "woff", "woff2", "ttf",
    "otf", "eot", "pdf", "wasm",
];

/// Prefix inspected for NUL bytes.
pub const SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Binary,
}

/// Whether the path's extension is on the binary list (case-insensitive).
#[must_use]
pub fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|b| b.eq_ignore_ascii_case(ext))
        })
}

/// Classify file content.
///
/// Binary if the extension says so, if a NUL byte occurs in the first
/// [`SNIFF_LEN`] bytes, or if the bytes are not valid UTF-8.
#[must_use]
pub fn classify(path: &Path, bytes: &[u8]) -> FileKind {
    if has_binary_extension(path) {
        return FileKind::Binary;
    }
    let prefix = &bytes[..bytes.len().min(SNIFF_LEN)];
    if prefix.contains(&0) {
        return FileKind::Binary;
    }
    if std::str::from_utf8(bytes).is_err() {
        return FileKind::Binary;
    }
    FileKind::Text
}
