#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::implicit_clone)]
#![allow(clippy::single_match_else)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::let_unit_value)]
#![allow(clippy::type_complexity)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::ptr_arg)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::if_not_else)]

//! Sync engine for devsync.
//!
//! The daemon provides:
//! - An in-memory file server with an append-only event log
//! - A recursive project watcher that batches local changes
//! - An engine that mirrors the project to the server and applies
//!   server-initiated edits back to disk
//!
//! ## Echo suppression
//! Uploads are tagged with `Initiator::FilesystemChange` and their content
//! hashes recorded, so neither side re-applies a change the other made.

pub mod client;
pub mod echo;
pub mod engine;
pub mod error;
pub mod poller;
pub mod server;
pub mod watch;

pub use client::FileServerClient;
pub use echo::SyncLedger;
pub use engine::{EngineOptions, EngineState, StartupSummary, SyncEngine};
pub use error::SyncError;
pub use poller::EventCursor;
pub use server::FileServer;
pub use watch::{FsChange, FsChangeKind, ProjectWatcher, WatchError};
