//! Project files and their wire encoding.

use crate::classify::{classify, FileKind};
use crate::paths::{is_ignored, ALWAYS_IGNORED_DIRS};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use devsync_proto::{Initiator, UpsertFileRequest, WireContent};
use devsync_util::fs::to_posix_path;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Decoded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Classify raw bytes and wrap them.
    #[must_use]
    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Self {
        match classify(path, &bytes) {
            FileKind::Binary => Self::Binary(bytes),
            FileKind::Text => match String::from_utf8(bytes) {
                Ok(text) => Self::Text(text),
                Err(e) => Self::Binary(e.into_bytes()),
            },
        }
    }

    /// Decode wire content.
    ///
    /// # Errors
    /// Returns an error if `binary_content_b64` is not valid base64.
    pub fn from_wire(content: &WireContent) -> Result<Self, base64::DecodeError> {
        match content {
            WireContent::Text { text_content } => Ok(Self::Text(text_content.clone())),
            WireContent::Binary { binary_content_b64 } => {
                STANDARD.decode(binary_content_b64).map(Self::Binary)
            }
        }
    }

    #[must_use]
    pub fn to_wire(&self) -> WireContent {
        match self {
            Self::Text(text) => WireContent::Text {
                text_content: text.clone(),
            },
            Self::Binary(bytes) => WireContent::Binary {
                binary_content_b64: STANDARD.encode(bytes),
            },
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FileKind {
        match self {
            Self::Text(_) => FileKind::Text,
            Self::Binary(_) => FileKind::Binary,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

/// A file keyed by its project-relative POSIX path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub content: FileContent,
    pub initiator: Option<Initiator>,
}

impl ProjectFile {
    #[must_use]
    pub fn new(path: impl Into<String>, content: FileContent) -> Self {
        Self {
            path: path.into(),
            content,
            initiator: None,
        }
    }

    /// Read and classify a file from disk, naming it `logical_path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn load(real_path: &Path, logical_path: impl Into<String>) -> std::io::Result<Self> {
        let bytes = std::fs::read(real_path)?;
        Ok(Self::new(logical_path, FileContent::from_bytes(real_path, bytes)))
    }

    #[must_use]
    pub fn with_initiator(mut self, initiator: Initiator) -> Self {
        self.initiator = Some(initiator);
        self
    }
}

/// Build the upsert body for a file.
#[must_use]
pub fn to_upload_payload(file: &ProjectFile) -> UpsertFileRequest {
    UpsertFileRequest {
        file_path: file.path.clone(),
        content: file.content.to_wire(),
        initiator: file.initiator,
    }
}

/// A file on disk together with its project-relative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute: PathBuf,
    pub path: String,
}

/// Every file under `root` outside ignored directories, sorted by path.
#[must_use]
pub fn list_project_files(root: &Path, ignored_dirs: &[String]) -> Vec<LocalFile> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !ALWAYS_IGNORED_DIRS.contains(&name.as_ref()) && !ignored_dirs.iter().any(|d| *d == name)
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).ok()?;
            let path = to_posix_path(relative)?;
            (!is_ignored(&path, ignored_dirs)).then(|| LocalFile {
                absolute: e.path().to_path_buf(),
                path,
            })
        })
        .collect()
}
