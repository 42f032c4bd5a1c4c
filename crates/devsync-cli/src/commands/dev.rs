//! `devsync dev` command implementation.
//!
//! Starts the file server, uploads the project and its dependency closure,
//! then mirrors changes in both directions until ctrl+c.

use super::locate_project;
use devsync_daemon::{EngineOptions, SyncEngine};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Dev command options; unset fields fall back to `devsync.config.json`.
#[derive(Debug, Clone)]
pub struct DevAction {
    pub cwd: PathBuf,
    pub entry: Option<PathBuf>,
    pub port: Option<u16>,
    pub poll_interval_ms: Option<u64>,
    /// Added to the configured ignored directories.
    pub ignore: Vec<String>,
    pub fetch_types: bool,
}

pub fn run(action: DevAction) -> Result<()> {
    let mut project = locate_project(&action.cwd, action.entry.as_deref())?;

    if let Some(port) = action.port {
        project.config.port = port;
    }
    if let Some(ms) = action.poll_interval_ms {
        project.config.poll_interval_ms = ms.max(1);
    }
    project.config.ignored_dirs.extend(action.ignore);
    project.config.fetch_missing_types |= action.fetch_types;

    let options = EngineOptions::from_config(project.root, project.entry, &project.config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(serve(options))
}

async fn serve(options: EngineOptions) -> Result<()> {
    let entry = options.entry.display().to_string();
    let mut engine = SyncEngine::new(options);

    let summary = engine.start().await.into_diagnostic()?;
    let url = engine.base_url().unwrap_or_default();

    println!("devsync serving {entry}");
    println!("  file server: {url}");
    println!(
        "  uploaded {} files ({} from {} packages)",
        summary.local_files + summary.closure_files,
        summary.closure_files,
        summary.packages
    );
    if summary.warnings > 0 {
        println!("  {} resolution warnings (run `devsync closure` for details)", summary.warnings);
    }
    println!("Watching for changes... (ctrl+c to exit)");

    signal::ctrl_c().await.into_diagnostic()?;
    println!();
    info!("shutting down");

    // A second ctrl+c skips the graceful stop.
    tokio::select! {
        result = engine.stop() => result.into_diagnostic()?,
        _ = signal::ctrl_c() => {}
        () = tokio::time::sleep(Duration::from_secs(10)) => {
            tracing::warn!("stop timed out");
        }
    }
    println!("Stopped.");
    Ok(())
}
