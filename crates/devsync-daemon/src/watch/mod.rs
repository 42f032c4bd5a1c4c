//! Recursive project watcher.
//!
//! notify's backend thread forwards raw paths into a channel; a tokio task
//! coalesces them and emits batches of project-relative changes. Whether a
//! path changed or disappeared is decided from the disk when the batch is
//! flushed, which folds create/modify/rename sequences into one change.

use devsync_core::paths::is_ignored;
use devsync_util::fs::to_posix_path;
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Event coalescing window.
const COALESCE_WINDOW_MS: u64 = 50;

/// Batches buffered before the watcher applies backpressure.
const BATCH_CHANNEL_CAPACITY: usize = 64;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsChangeKind {
    /// Created or modified; the file exists.
    Changed,
    Removed,
}

/// One coalesced change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    /// Project-relative POSIX path.
    pub path: String,
    pub absolute: PathBuf,
    pub kind: FsChangeKind,
}

/// Watcher handle.
#[derive(Debug, Default)]
pub struct ProjectWatcher {
    running: AtomicBool,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ProjectWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start watching `root` recursively.
    ///
    /// Paths under `node_modules`, `.git`, or any of `ignored_dirs` are never
    /// reported. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if already running, if `root` is not a directory, or
    /// if the platform watcher cannot be created.
    pub fn start(
        &self,
        root: &Path,
        ignored_dirs: Vec<String>,
    ) -> Result<mpsc::Receiver<Vec<FsChange>>, WatchError> {
        if self.running.load(Ordering::Relaxed) {
            return Err(WatchError::AlreadyRunning);
        }
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.display().to_string()));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if should_process_event(&event) {
                        for path in event.paths {
                            if raw_tx.send(path).is_err() {
                                debug!("watch channel closed");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "watch error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;
        info!(root = %root.display(), "watching project");

        *lock(&self.watcher) = Some(watcher);
        self.running.store(true, Ordering::Relaxed);

        let root = root.to_path_buf();
        tokio::spawn(async move {
            coalesce_events(raw_rx, batch_tx, &root, &ignored_dirs).await;
        });

        Ok(batch_rx)
    }

    /// Stop watching. The batch channel closes once pending paths are flushed.
    ///
    /// # Errors
    /// Returns an error if the watcher is not running.
    pub fn stop(&self) -> Result<(), WatchError> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(WatchError::NotRunning);
        }
        *lock(&self.watcher) = None;
        self.running.store(false, Ordering::Relaxed);
        info!("file watcher stopped");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn coalesce_events(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    tx: mpsc::Sender<Vec<FsChange>>,
    root: &Path,
    ignored_dirs: &[String],
) {
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();

    loop {
        let next = tokio::time::timeout(Duration::from_millis(COALESCE_WINDOW_MS), rx.recv()).await;
        match next {
            Ok(Some(path)) => {
                pending.insert(path);
            }
            Ok(None) => {
                debug!("watch event channel closed");
                break;
            }
            Err(_) => {
                if pending.is_empty() {
                    continue;
                }
                let batch = to_changes(std::mem::take(&mut pending), root, ignored_dirs);
                if batch.is_empty() {
                    continue;
                }
                debug!(count = batch.len(), "processing coalesced file events");
                if tx.send(batch).await.is_err() {
                    break;
                }
            }
        }
    }

    let batch = to_changes(pending, root, ignored_dirs);
    if !batch.is_empty() && tx.send(batch).await.is_err() {
        warn!("dropped final watch batch");
    }
}

fn to_changes(paths: BTreeSet<PathBuf>, root: &Path, ignored_dirs: &[String]) -> Vec<FsChange> {
    paths
        .into_iter()
        .filter_map(|absolute| {
            let path = absolute.strip_prefix(root).ok().and_then(to_posix_path)?;
            if path.is_empty() || is_ignored(&path, ignored_dirs) {
                return None;
            }
            let kind = if absolute.is_file() {
                FsChangeKind::Changed
            } else if absolute.exists() {
                return None;
            } else {
                FsChangeKind::Removed
            };
            Some(FsChange {
                path,
                absolute,
                kind,
            })
        })
        .collect()
}

/// Check if we should process this event.
fn should_process_event(event: &Event) -> bool {
    match &event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
        | EventKind::Remove(RemoveKind::File | RemoveKind::Any) => true,
        // Directories, metadata changes, and access events
        _ => false,
    }
}

/// Watcher error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    #[error("watcher is already running")]
    AlreadyRunning,
    #[error("watcher is not running")]
    NotRunning,
    #[error("invalid watch root: {0}")]
    InvalidRoot(String),
    #[error("watcher failed: {0}")]
    WatcherFailed(String),
}
