use crate::error::Error;
use crate::paths::{CONFIG_FILE_NAME, DEFAULT_IGNORED_DIRS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the npm registry used for type fetches.
pub const REGISTRY_ENV: &str = "DEVSYNC_NPM_REGISTRY";

/// Default public npm registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/";

/// Packages the remote renderer supplies natively.
pub const DEFAULT_RUNTIME_PROVIDED: &[&str] = &["react", "react-dom", "tscircuit", "@tscircuit/core"];

/// Default interval between event log polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default port of the owned file server.
pub const DEFAULT_PORT: u16 = 3020;

/// Runtime configuration for devsync CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Per-project sync settings.
///
/// Read from `devsync.config.json` in the project root; every field is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Entry file, relative to the project root.
    pub entry: Option<PathBuf>,
    /// Build/output directory names skipped by the initial scan and the watcher.
    pub ignored_dirs: Vec<String>,
    /// Packages never uploaded.
    pub runtime_provided: Vec<String>,
    pub poll_interval_ms: u64,
    /// Fetch `.d.ts` files for scoped imports that have none.
    pub fetch_missing_types: bool,
    pub registry_url: String,
    pub port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            entry: None,
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
            runtime_provided: DEFAULT_RUNTIME_PROVIDED
                .iter()
                .map(ToString::to_string)
                .collect(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fetch_missing_types: false,
            registry_url: std::env::var(REGISTRY_ENV)
                .unwrap_or_else(|_| DEFAULT_REGISTRY_URL.to_string()),
            port: DEFAULT_PORT,
        }
    }
}

/// Load `devsync.config.json` from `root`, or defaults if it does not exist.
pub fn load_sync_config(root: &Path) -> Result<SyncConfig, Error> {
    let path = root.join(CONFIG_FILE_NAME);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SyncConfig::default()),
        Err(source) => return Err(Error::ConfigRead { path, source }),
    };
    serde_json::from_str(&content).map_err(|source| Error::ConfigParse { path, source })
}
