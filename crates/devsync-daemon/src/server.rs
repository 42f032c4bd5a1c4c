//! In-memory file server owned by the engine.
//!
//! Serves the file table and event log the browser renderer reads. Every
//! upsert and delete appends an event carrying the caller's `initiator`.

use crate::error::SyncError;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use devsync_proto::{
    codes, endpoints, event_types, CreateEventRequest, CreateEventResponse, DeleteFileRequest,
    ErrorBody, FileListEntry, FileRecord, GetFileResponse, ListEventsResponse, ListFilesResponse,
    SyncEvent, UpsertFileRequest, UpsertFileResponse,
};
use devsync_util::fs::is_safe_relative_path;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct Store {
    files: BTreeMap<String, FileRecord>,
    events: Vec<SyncEvent>,
    next_event_id: u64,
}

impl Store {
    fn push_event(&mut self, event_type: &str, payload: Map<String, Value>) -> SyncEvent {
        self.next_event_id += 1;
        let event = SyncEvent {
            event_id: self.next_event_id.to_string(),
            event_type: event_type.to_string(),
            created_at: Utc::now(),
            payload,
        };
        self.events.push(event.clone());
        event
    }
}

type SharedStore = Arc<Mutex<Store>>;

fn lock(store: &SharedStore) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build the router for the file server API.
pub fn router() -> Router {
    let store = SharedStore::default();
    Router::new()
        .route(&route(endpoints::FILES_UPSERT), post(upsert_file))
        .route(&route(endpoints::FILES_GET), get(get_file))
        .route(&route(endpoints::FILES_LIST), get(list_files))
        .route(&route(endpoints::FILES_DELETE), post(delete_file))
        .route(&route(endpoints::EVENTS_LIST), get(list_events))
        .route(&route(endpoints::EVENTS_CREATE), post(create_event))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

fn route(endpoint: &str) -> String {
    format!("/{endpoint}")
}

/// A running file server.
#[derive(Debug)]
pub struct FileServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FileServer {
    /// Bind `addr` and serve in a background task.
    ///
    /// # Errors
    /// Returns [`SyncError::Bind`] if the address cannot be bound.
    pub async fn start(addr: SocketAddr) -> Result<Self, SyncError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| SyncError::Bind { addr, source })?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = router();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "file server failed");
            }
        });

        info!(%addr, "file server listening");
        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients should use, with a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Signal shutdown and wait for in-flight requests to finish.
    pub async fn stop(&mut self) -> Result<(), SyncError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await?;
            info!(addr = %self.addr, "file server stopped");
        }
        Ok(())
    }
}

struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::new(codes::INVALID_REQUEST, message),
        }
    }

    fn not_found(file_path: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody::new(codes::FILE_NOT_FOUND, format!("file not found: {file_path}")),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn check_path(file_path: &str) -> Result<(), ApiError> {
    if is_safe_relative_path(file_path) {
        Ok(())
    } else {
        Err(ApiError::invalid(format!("unsafe file path: {file_path}")))
    }
}

fn file_event_payload(file_path: &str, initiator: Option<&str>) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("file_path".to_string(), Value::from(file_path));
    if let Some(initiator) = initiator {
        payload.insert("initiator".to_string(), Value::from(initiator));
    }
    payload
}

async fn upsert_file(
    State(store): State<SharedStore>,
    body: Result<Json<UpsertFileRequest>, JsonRejection>,
) -> Result<Json<UpsertFileResponse>, ApiError> {
    let Json(request) = body?;
    check_path(&request.file_path)?;

    let record = FileRecord {
        file_path: request.file_path.clone(),
        content: request.content,
        created_at: Utc::now(),
    };

    let mut store = lock(&store);
    store
        .files
        .insert(request.file_path.clone(), record.clone());
    let payload = file_event_payload(
        &request.file_path,
        request.initiator.as_ref().map(devsync_proto::Initiator::as_str),
    );
    store.push_event(event_types::FILE_UPDATED, payload);
    debug!(file_path = %request.file_path, "file upserted");

    Ok(Json(UpsertFileResponse { file: record }))
}

#[derive(Debug, Deserialize)]
struct FilePathQuery {
    file_path: String,
}

async fn get_file(
    State(store): State<SharedStore>,
    Query(query): Query<FilePathQuery>,
) -> Result<Json<GetFileResponse>, ApiError> {
    let store = lock(&store);
    store
        .files
        .get(&query.file_path)
        .map(|file| Json(GetFileResponse { file: file.clone() }))
        .ok_or_else(|| ApiError::not_found(&query.file_path))
}

async fn list_files(State(store): State<SharedStore>) -> Json<ListFilesResponse> {
    let store = lock(&store);
    let file_list = store
        .files
        .values()
        .map(|f| FileListEntry {
            file_path: f.file_path.clone(),
            created_at: f.created_at,
        })
        .collect();
    Json(ListFilesResponse { file_list })
}

async fn delete_file(
    State(store): State<SharedStore>,
    body: Result<Json<DeleteFileRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body?;
    let mut store = lock(&store);
    if store.files.remove(&request.file_path).is_none() {
        return Err(ApiError::not_found(&request.file_path));
    }
    store.push_event(
        event_types::FILE_DELETED,
        file_event_payload(&request.file_path, None),
    );
    debug!(file_path = %request.file_path, "file deleted");
    Ok(Json(Value::Object(Map::new())))
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    since: Option<DateTime<Utc>>,
}

async fn list_events(
    State(store): State<SharedStore>,
    Query(query): Query<SinceQuery>,
) -> Json<ListEventsResponse> {
    let store = lock(&store);
    let event_list = store
        .events
        .iter()
        .filter(|e| query.since.map_or(true, |since| e.created_at >= since))
        .cloned()
        .collect();
    Json(ListEventsResponse { event_list })
}

async fn create_event(
    State(store): State<SharedStore>,
    body: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<Json<CreateEventResponse>, ApiError> {
    let Json(request) = body?;
    if request.event_type.is_empty() {
        return Err(ApiError::invalid("event_type is required"));
    }
    let event = lock(&store).push_event(&request.event_type, request.payload);
    Ok(Json(CreateEventResponse { event }))
}
