//! HTTP client for the file server API.

use crate::error::SyncError;
use chrono::{DateTime, SecondsFormat, Utc};
use devsync_proto::{
    endpoints, CreateEventRequest, CreateEventResponse, DeleteFileRequest, ErrorBody,
    FileListEntry, FileRecord, GetFileResponse, ListEventsResponse, ListFilesResponse, SyncEvent,
    UpsertFileRequest, UpsertFileResponse,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FileServerClient {
    http: Client,
    base: Url,
}

impl FileServerClient {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized).map_err(|source| SyncError::Url {
            url: base_url.to_string(),
            source,
        })?;

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("devsync/{}", devsync_core::VERSION))
            .build()
            .map_err(|source| SyncError::Http {
                endpoint: base.to_string(),
                source,
            })?;

        Ok(Self { http, base })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, endpoint: &str) -> Result<Url, SyncError> {
        self.base.join(endpoint).map_err(|source| SyncError::Url {
            url: format!("{}{endpoint}", self.base),
            source,
        })
    }

    /// Create or replace a file.
    pub async fn upsert_file(&self, request: &UpsertFileRequest) -> Result<FileRecord, SyncError> {
        let req = self.http.post(self.url(endpoints::FILES_UPSERT)?).json(request);
        let response: UpsertFileResponse = send(endpoints::FILES_UPSERT, req).await?;
        Ok(response.file)
    }

    /// Fetch a file; `None` if the server does not have it.
    pub async fn get_file(&self, file_path: &str) -> Result<Option<FileRecord>, SyncError> {
        let req = self
            .http
            .get(self.url(endpoints::FILES_GET)?)
            .query(&[("file_path", file_path)]);
        match send::<GetFileResponse>(endpoints::FILES_GET, req).await {
            Ok(response) => Ok(Some(response.file)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_files(&self) -> Result<Vec<FileListEntry>, SyncError> {
        let req = self.http.get(self.url(endpoints::FILES_LIST)?);
        let response: ListFilesResponse = send(endpoints::FILES_LIST, req).await?;
        Ok(response.file_list)
    }

    /// Delete a file. Returns `false` if it did not exist.
    pub async fn delete_file(&self, file_path: &str) -> Result<bool, SyncError> {
        let body = DeleteFileRequest {
            file_path: file_path.to_string(),
        };
        let req = self.http.post(self.url(endpoints::FILES_DELETE)?).json(&body);
        match send::<serde_json::Value>(endpoints::FILES_DELETE, req).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Events created at or after `since`, or all of them.
    pub async fn list_events(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SyncEvent>, SyncError> {
        let mut req = self.http.get(self.url(endpoints::EVENTS_LIST)?);
        if let Some(since) = since {
            req = req.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Micros, true))]);
        }
        let response: ListEventsResponse = send(endpoints::EVENTS_LIST, req).await?;
        Ok(response.event_list)
    }

    pub async fn create_event(&self, request: &CreateEventRequest) -> Result<SyncEvent, SyncError> {
        let req = self.http.post(self.url(endpoints::EVENTS_CREATE)?).json(request);
        let response: CreateEventResponse = send(endpoints::EVENTS_CREATE, req).await?;
        Ok(response.event)
    }
}

async fn send<T: DeserializeOwned>(endpoint: &str, req: RequestBuilder) -> Result<T, SyncError> {
    let http_error = |source: reqwest::Error| SyncError::Http {
        endpoint: endpoint.to_string(),
        source,
    };

    let response = req.send().await.map_err(http_error)?;
    let status = response.status();
    if !status.is_success() {
        let message = error_message(status, response.text().await.unwrap_or_default());
        return Err(SyncError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    response.json::<T>().await.map_err(http_error)
}

fn error_message(status: StatusCode, body: String) -> String {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => format!("{}: {}", parsed.error.error_code, parsed.error.message),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => body,
    }
}
