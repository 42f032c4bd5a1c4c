#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Wire types for the devsync file server API.
//!
//! The file server exposes a small JSON-over-HTTP surface:
//!
//! | Method | Path                 | Body / query                  |
//! |--------|----------------------|-------------------------------|
//! | POST   | `api/files/upsert`   | [`UpsertFileRequest`]         |
//! | GET    | `api/files/get`      | `?file_path=`                 |
//! | GET    | `api/files/list`     | -                             |
//! | POST   | `api/files/delete`   | [`DeleteFileRequest`]         |
//! | GET    | `api/events/list`    | `?since=` (RFC 3339, inclusive) |
//! | POST   | `api/events/create`  | [`CreateEventRequest`]        |
//!
//! File content travels as either `text_content` or `binary_content_b64`,
//! never both. [`WireContent`] makes the two mutually exclusive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Endpoint paths, relative to the server base URL.
pub mod endpoints {
    pub const FILES_UPSERT: &str = "api/files/upsert";
    pub const FILES_GET: &str = "api/files/get";
    pub const FILES_LIST: &str = "api/files/list";
    pub const FILES_DELETE: &str = "api/files/delete";
    pub const EVENTS_LIST: &str = "api/events/list";
    pub const EVENTS_CREATE: &str = "api/events/create";
}

/// Event types written to the event log.
pub mod event_types {
    /// A file was created or replaced. Payload: `file_path`, `initiator`.
    pub const FILE_UPDATED: &str = "FILE_UPDATED";
    /// A file was removed. Payload: `file_path`, `initiator`.
    pub const FILE_DELETED: &str = "FILE_DELETED";
    /// Terminal bootstrap event: the initial batch and the dependency
    /// closure are both uploaded.
    pub const INITIAL_FILES_UPLOADED: &str = "INITIAL_FILES_UPLOADED";
}

/// Error codes returned in [`ErrorBody`].
pub mod codes {
    pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Who caused a file change.
///
/// The engine tags its own uploads with [`Initiator::FilesystemChange`] so
/// that the echo of those uploads in the event log can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    FilesystemChange,
    Server,
}

impl Initiator {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilesystemChange => "filesystem_change",
            Self::Server => "server",
        }
    }
}

/// File content as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text { text_content: String },
    Binary { binary_content_b64: String },
}

impl WireContent {
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary { .. })
    }
}

/// A stored file as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    #[serde(flatten)]
    pub content: WireContent,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST api/files/upsert`.
///
/// Deserialization rejects bodies that carry both content fields or neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUpsertFileRequest")]
pub struct UpsertFileRequest {
    pub file_path: String,
    #[serde(flatten)]
    pub content: WireContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<Initiator>,
}

#[derive(Deserialize)]
struct RawUpsertFileRequest {
    file_path: String,
    text_content: Option<String>,
    binary_content_b64: Option<String>,
    initiator: Option<Initiator>,
}

impl TryFrom<RawUpsertFileRequest> for UpsertFileRequest {
    type Error = String;

    fn try_from(raw: RawUpsertFileRequest) -> Result<Self, Self::Error> {
        let content = match (raw.text_content, raw.binary_content_b64) {
            (Some(text_content), None) => WireContent::Text { text_content },
            (None, Some(binary_content_b64)) => WireContent::Binary { binary_content_b64 },
            (Some(_), Some(_)) => {
                return Err("text_content and binary_content_b64 are mutually exclusive".into())
            }
            (None, None) => {
                return Err("one of text_content or binary_content_b64 is required".into())
            }
        };
        Ok(Self {
            file_path: raw.file_path,
            content,
            initiator: raw.initiator,
        })
    }
}

/// Response of `POST api/files/upsert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertFileResponse {
    pub file: FileRecord,
}

/// Response of `GET api/files/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileResponse {
    pub file: FileRecord,
}

/// One entry of `GET api/files/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListEntry {
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

/// Response of `GET api/files/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub file_list: Vec<FileListEntry>,
}

/// Body of `POST api/files/delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub file_path: String,
}

/// An entry of the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub event_id: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl SyncEvent {
    /// The `file_path` payload field, if present.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.payload.get("file_path").and_then(Value::as_str)
    }

    /// The `initiator` payload field, if present and recognised.
    #[must_use]
    pub fn initiator(&self) -> Option<Initiator> {
        self.payload
            .get("initiator")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Response of `GET api/events/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEventsResponse {
    pub event_list: Vec<SyncEvent>,
}

/// Body of `POST api/events/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub event_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CreateEventRequest {
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

/// Response of `POST api/events/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventResponse {
    pub event: SyncEvent,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_code: String,
    pub message: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                error_code: error_code.to_string(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_text_serializes_only_text_field() {
        let req = UpsertFileRequest {
            file_path: "index.tsx".to_string(),
            content: WireContent::Text {
                text_content: "export default () => null".to_string(),
            },
            initiator: Some(Initiator::FilesystemChange),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["file_path"], "index.tsx");
        assert_eq!(value["text_content"], "export default () => null");
        assert_eq!(value["initiator"], "filesystem_change");
        assert!(value.get("binary_content_b64").is_none());
    }

    #[test]
    fn test_upsert_binary_serializes_only_binary_field() {
        let req = UpsertFileRequest {
            file_path: "model.glb".to_string(),
            content: WireContent::Binary {
                binary_content_b64: "AAEC".to_string(),
            },
            initiator: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["binary_content_b64"], "AAEC");
        assert!(value.get("text_content").is_none());
        assert!(value.get("initiator").is_none());
    }

    #[test]
    fn test_upsert_rejects_both_content_fields() {
        let body = json!({
            "file_path": "a.txt",
            "text_content": "a",
            "binary_content_b64": "YQ=="
        });
        assert!(serde_json::from_value::<UpsertFileRequest>(body).is_err());
    }

    #[test]
    fn test_upsert_rejects_missing_content() {
        let body = json!({ "file_path": "a.txt" });
        assert!(serde_json::from_value::<UpsertFileRequest>(body).is_err());
    }

    #[test]
    fn test_upsert_parses_binary_with_initiator() {
        let body = json!({
            "file_path": "a.png",
            "binary_content_b64": "iVBO",
            "initiator": "server"
        });
        let req: UpsertFileRequest = serde_json::from_value(body).unwrap();
        assert!(req.content.is_binary());
        assert_eq!(req.initiator, Some(Initiator::Server));
    }

    #[test]
    fn test_event_payload_accessors() {
        let body = json!({
            "event_id": "7",
            "event_type": "FILE_UPDATED",
            "created_at": "2024-05-01T10:00:00Z",
            "file_path": "manual-edits.json",
            "initiator": "filesystem_change"
        });
        let event: SyncEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.event_type, event_types::FILE_UPDATED);
        assert_eq!(event.file_path(), Some("manual-edits.json"));
        assert_eq!(event.initiator(), Some(Initiator::FilesystemChange));
    }

    #[test]
    fn test_event_unknown_initiator_is_none() {
        let body = json!({
            "event_id": "1",
            "event_type": "FILE_UPDATED",
            "created_at": "2024-05-01T10:00:00Z",
            "file_path": "a.ts",
            "initiator": "browser"
        });
        let event: SyncEvent = serde_json::from_value(body).unwrap();
        assert_eq!(event.initiator(), None);
    }

    #[test]
    fn test_create_event_flattens_payload() {
        let req = CreateEventRequest::new(event_types::INITIAL_FILES_UPLOADED).with("file_count", 3);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({ "event_type": "INITIAL_FILES_UPLOADED", "file_count": 3 }));
    }
}
