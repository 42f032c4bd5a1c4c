//! The sync engine: owns the file server, watcher, and event poller.
//!
//! ```text
//! Stopped ──start()──▶ Starting ──▶ Watching ──stop()──▶ Stopping ──▶ Stopped
//! ```
//!
//! Starting uploads every project file, then the dependency closure of the
//! entry file, then emits `INITIAL_FILES_UPLOADED`. While watching, local
//! changes are upserted and remote `FILE_UPDATED` events not caused by the
//! engine are written back to disk.

use crate::client::FileServerClient;
use crate::echo::SyncLedger;
use crate::error::SyncError;
use crate::poller::EventCursor;
use crate::server::FileServer;
use crate::watch::{FsChange, FsChangeKind, ProjectWatcher};
use devsync_core::closure::DependencyResolver;
use devsync_core::config::SyncConfig;
use devsync_core::paths::MANUAL_EDITS_FILE;
use devsync_core::pkg::{type_check_specifiers, RegistryClient, TypeCheckOutcome, TypeFetcher};
use devsync_core::project::{list_project_files, to_upload_payload, FileContent, ProjectFile};
use devsync_proto::{event_types, CreateEventRequest, Initiator, SyncEvent};
use devsync_util::fs::{atomic_write, is_safe_relative_path};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long `stop` waits for queued local changes to be uploaded.
const LOCAL_LOOP_DRAIN: Duration = Duration::from_secs(5);

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Watching,
    Stopping,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Watching => "watching",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Everything the engine needs to run one session.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Project directory.
    pub root: PathBuf,
    /// Entry file the dependency closure starts from.
    pub entry: PathBuf,
    /// Build/output directories, in addition to `node_modules` and `.git`.
    pub ignored_dirs: Vec<String>,
    pub runtime_provided: Vec<String>,
    pub poll_interval: Duration,
    pub bind_addr: SocketAddr,
    /// Registry to fetch missing type declarations from, if enabled.
    pub type_registry: Option<String>,
}

impl EngineOptions {
    /// Options for `root` and `entry` taken from a loaded config.
    #[must_use]
    pub fn from_config(root: PathBuf, entry: PathBuf, config: &SyncConfig) -> Self {
        Self {
            root,
            entry,
            ignored_dirs: config.ignored_dirs.clone(),
            runtime_provided: config.runtime_provided.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.port),
            type_registry: config
                .fetch_missing_types
                .then(|| config.registry_url.clone()),
        }
    }
}

/// Counts from the bootstrap upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupSummary {
    pub local_files: usize,
    pub closure_files: usize,
    pub packages: usize,
    pub warnings: usize,
}

/// State shared with the background tasks.
struct Session {
    root: PathBuf,
    client: FileServerClient,
    ledger: Mutex<SyncLedger>,
    /// Cleared when stopping; no new uploads start afterwards.
    accepting: AtomicBool,
    type_fetcher: Option<TypeFetcher>,
}

impl Session {
    fn ledger(&self) -> MutexGuard<'_, SyncLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

pub struct SyncEngine {
    options: EngineOptions,
    state: EngineState,
    server: Option<FileServer>,
    watcher: ProjectWatcher,
    session: Option<Arc<Session>>,
    cancel: Option<watch::Sender<bool>>,
    poller: Option<JoinHandle<()>>,
    local_loop: Option<JoinHandle<()>>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            state: EngineState::Stopped,
            server: None,
            watcher: ProjectWatcher::new(),
            session: None,
            cancel: None,
            poller: None,
            local_loop: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Base URL of the owned file server while it runs.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.server.as_ref().map(FileServer::base_url)
    }

    /// Start the server, poller, and watcher, then upload the project.
    ///
    /// # Errors
    /// Fails if the engine is not stopped, or if the file server or watcher
    /// cannot start. Upload and resolution problems are logged instead.
    pub async fn start(&mut self) -> Result<StartupSummary, SyncError> {
        if self.state != EngineState::Stopped {
            return Err(SyncError::InvalidState(self.state.to_string()));
        }
        self.state = EngineState::Starting;

        match self.start_inner().await {
            Ok(summary) => {
                self.state = EngineState::Watching;
                info!(
                    local_files = summary.local_files,
                    closure_files = summary.closure_files,
                    packages = summary.packages,
                    "initial upload complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.shutdown().await;
                self.state = EngineState::Stopped;
                Err(e)
            }
        }
    }

    async fn start_inner(&mut self) -> Result<StartupSummary, SyncError> {
        let root = dunce::canonicalize(&self.options.root)?;

        let server = FileServer::start(self.options.bind_addr).await?;
        let client = FileServerClient::new(&server.base_url())?;
        self.server = Some(server);

        let type_fetcher = match &self.options.type_registry {
            Some(url) => match RegistryClient::new(url) {
                Ok(registry) => Some(TypeFetcher::new(registry)),
                Err(e) => {
                    warn!(error = %e, "type declaration fetch disabled");
                    None
                }
            },
            None => None,
        };

        let session = Arc::new(Session {
            root: root.clone(),
            client,
            ledger: Mutex::new(SyncLedger::new()),
            accepting: AtomicBool::new(true),
            type_fetcher,
        });
        self.session = Some(Arc::clone(&session));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel = Some(cancel_tx);
        self.poller = Some(tokio::spawn(poll_events(
            Arc::clone(&session),
            self.options.poll_interval,
            cancel_rx,
        )));

        let batches = self.watcher.start(&root, self.options.ignored_dirs.clone())?;
        self.local_loop = Some(tokio::spawn(local_loop(Arc::clone(&session), batches)));

        Ok(self.initial_upload(&session).await)
    }

    async fn initial_upload(&self, session: &Session) -> StartupSummary {
        let mut summary = StartupSummary::default();
        let mut uploaded: HashSet<String> = HashSet::new();

        for local in list_project_files(&session.root, &self.options.ignored_dirs) {
            match ProjectFile::load(&local.absolute, local.path.clone()) {
                Ok(file) => {
                    ensure_types(session, &file).await;
                    if upload(session, file).await {
                        summary.local_files += 1;
                    }
                    uploaded.insert(local.path);
                }
                Err(e) => warn!(path = %local.path, error = %e, "cannot read project file"),
            }
        }

        let entry = if self.options.entry.is_absolute() {
            self.options.entry.clone()
        } else {
            session.root.join(&self.options.entry)
        };
        let root = session.root.clone();
        let runtime_provided = self.options.runtime_provided.clone();
        let resolved = tokio::task::spawn_blocking(move || {
            DependencyResolver::new(&root, &runtime_provided).resolve_closure(&entry)
        })
        .await;
        match resolved {
            Ok(Ok(closure)) => {
                summary.packages = closure.packages.len();
                summary.warnings = closure.warnings.len();
                for w in &closure.warnings {
                    warn!(code = %w.code, path = %w.path, "{}", w.message);
                }
                for file in closure.files() {
                    if uploaded.insert(file.path.clone()) && upload(session, file.clone()).await {
                        summary.closure_files += 1;
                    }
                }
            }
            Ok(Err(e)) => warn!(error = %e, "dependency closure skipped"),
            Err(e) => warn!(error = %e, "dependency closure task failed"),
        }

        let event = CreateEventRequest::new(event_types::INITIAL_FILES_UPLOADED)
            .with("file_count", summary.local_files + summary.closure_files);
        if let Err(e) = session.client.create_event(&event).await {
            warn!(error = %e, "failed to emit {}", event_types::INITIAL_FILES_UPLOADED);
        }

        summary
    }

    /// Stop the watcher, the poller, and the server.
    ///
    /// # Errors
    /// Fails only if the engine is not running.
    pub async fn stop(&mut self) -> Result<(), SyncError> {
        if self.state != EngineState::Watching {
            return Err(SyncError::InvalidState(self.state.to_string()));
        }
        self.state = EngineState::Stopping;
        self.shutdown().await;
        self.state = EngineState::Stopped;
        info!("sync engine stopped");
        Ok(())
    }

    /// Tear down whatever is running. Each step fails independently.
    async fn shutdown(&mut self) {
        if let Some(session) = &self.session {
            session.accepting.store(false, Ordering::SeqCst);
        }

        if self.watcher.is_running() {
            if let Err(e) = self.watcher.stop() {
                warn!(error = %e, "failed to stop watcher");
            }
        }

        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        if let Some(poller) = self.poller.take() {
            poller.abort();
            if let Err(e) = poller.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "event poller failed");
                }
            }
        }

        // Let the in-flight upload finish.
        if let Some(mut local_loop) = self.local_loop.take() {
            match tokio::time::timeout(LOCAL_LOOP_DRAIN, &mut local_loop).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "local change loop failed"),
                Err(_) => {
                    warn!("local change loop did not drain, aborting");
                    local_loop.abort();
                }
            }
        }

        if let Some(mut server) = self.server.take() {
            if let Err(e) = server.stop().await {
                warn!(error = %e, "failed to stop file server");
            }
        }

        self.session = None;
    }
}

/// Upsert one file tagged as a filesystem change. Returns whether it landed.
async fn upload(session: &Session, file: ProjectFile) -> bool {
    let file = file.with_initiator(Initiator::FilesystemChange);
    match session.client.upsert_file(&to_upload_payload(&file)).await {
        Ok(_) => {
            session.ledger().record(&file.path, file.content.as_bytes());
            debug!(path = %file.path, "uploaded");
            true
        }
        Err(e) => {
            warn!(path = %file.path, error = %e, "upload failed");
            false
        }
    }
}

async fn local_loop(session: Arc<Session>, mut batches: mpsc::Receiver<Vec<FsChange>>) {
    while let Some(batch) = batches.recv().await {
        for change in batch {
            if !session.accepting() {
                debug!(path = %change.path, "engine stopping, change dropped");
                continue;
            }
            match change.kind {
                FsChangeKind::Changed => handle_local_change(&session, &change).await,
                FsChangeKind::Removed => handle_local_removal(&session, &change).await,
            }
        }
    }
    debug!("local change loop finished");
}

async fn handle_local_change(session: &Session, change: &FsChange) {
    if change.path == MANUAL_EDITS_FILE {
        debug!("manual edits are only synced from the server");
        return;
    }

    let bytes = match tokio::fs::read(&change.absolute).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %change.path, error = %e, "cannot read changed file");
            return;
        }
    };
    if session.ledger().matches(&change.path, &bytes) {
        debug!(path = %change.path, "unchanged since last sync");
        return;
    }

    let file = ProjectFile::new(
        change.path.clone(),
        FileContent::from_bytes(&change.absolute, bytes),
    );

    ensure_types(session, &file).await;
    if upload(session, file).await {
        info!(path = %change.path, "synced local change");
    }
}

/// Fetch missing declarations for the scoped imports of `file`, if enabled.
async fn ensure_types(session: &Session, file: &ProjectFile) {
    let (Some(fetcher), Some(text)) = (&session.type_fetcher, file.content.as_text()) else {
        return;
    };
    let specifiers = type_check_specifiers(text);
    for outcome in fetcher.ensure_types(&session.root, &specifiers).await {
        match outcome {
            TypeCheckOutcome::Fetched { name, files } => {
                info!(package = %name, files, "fetched type declarations");
            }
            TypeCheckOutcome::Failed { name, error } => {
                warn!(package = %name, error = %error, "type declaration fetch failed");
            }
        }
    }
}

async fn handle_local_removal(session: &Session, change: &FsChange) {
    if change.path == MANUAL_EDITS_FILE || !session.ledger().knows(&change.path) {
        return;
    }
    match session.client.delete_file(&change.path).await {
        Ok(existed) => {
            session.ledger().forget(&change.path);
            info!(path = %change.path, existed, "synced local removal");
        }
        Err(e) => warn!(path = %change.path, error = %e, "remote delete failed"),
    }
}

async fn poll_events(session: Arc<Session>, interval: Duration, mut cancel: watch::Receiver<bool>) {
    let mut cursor = EventCursor::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.changed() => break,
        }
        if *cancel.borrow() {
            break;
        }

        let events = match session.client.list_events(cursor.since()).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "event poll failed");
                continue;
            }
        };
        for event in cursor.advance(events) {
            handle_remote_event(&session, &event).await;
        }
    }
    debug!("event poller finished");
}

async fn handle_remote_event(session: &Session, event: &SyncEvent) {
    if event.event_type == event_types::FILE_DELETED {
        debug!(path = ?event.file_path(), "remote deletion not applied locally");
        return;
    }
    if event.event_type != event_types::FILE_UPDATED {
        return;
    }
    if event.initiator() == Some(Initiator::FilesystemChange) {
        return;
    }
    let Some(file_path) = event.file_path() else {
        return;
    };
    if !is_safe_relative_path(file_path) {
        warn!(path = %file_path, "refusing to write unsafe remote path");
        return;
    }

    let record = match session.client.get_file(file_path).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!(path = %file_path, "remote file vanished before fetch");
            return;
        }
        Err(e) => {
            warn!(path = %file_path, error = %e, "cannot fetch remote file");
            return;
        }
    };
    let content = match FileContent::from_wire(&record.content) {
        Ok(content) => content,
        Err(source) => {
            let e = SyncError::Decode {
                file_path: file_path.to_string(),
                source,
            };
            warn!(error = %e, "cannot decode remote file");
            return;
        }
    };

    write_remote_file(session, file_path, content.as_bytes().to_vec()).await;
}

async fn write_remote_file(session: &Session, file_path: &str, bytes: Vec<u8>) {
    {
        let mut ledger = session.ledger();
        if ledger.matches(file_path, &bytes) {
            return;
        }
        // Recorded first so the watcher's report of this write is recognised.
        ledger.record(file_path, &bytes);
    }

    let target = session.root.join(Path::new(file_path));
    let written = tokio::task::spawn_blocking(move || atomic_write(&target, &bytes))
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)));
    match written {
        Ok(()) => info!(path = %file_path, "applied remote change"),
        Err(e) => {
            session.ledger().forget(file_path);
            warn!(path = %file_path, error = %e, "cannot write remote change");
        }
    }
}
