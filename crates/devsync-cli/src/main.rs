#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use devsync_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devsync")]
#[command(author, version, about = "Mirror a component project to a live preview server", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Start the file server and keep the project in sync with it
    Dev {
        /// Entry file (defaults to the configured entry, then index.tsx and friends)
        entry: Option<PathBuf>,

        /// Port for the file server
        #[arg(short, long)]
        port: Option<u16>,

        /// Milliseconds between event log polls
        #[arg(long, value_name = "MS")]
        poll_interval_ms: Option<u64>,

        /// Additional directory names to leave out of the sync
        #[arg(long, value_name = "DIR")]
        ignore: Vec<String>,

        /// Fetch missing type declarations for scoped imports
        #[arg(long)]
        fetch_types: bool,
    },

    /// Print the files that would be uploaded for an entry file
    Closure {
        /// Entry file (defaults to the configured entry, then index.tsx and friends)
        entry: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let json = cli.json;
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    // Logs go to stderr, so --json output on stdout stays parseable.
    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Closure { entry }) => {
            commands::closure::run(&config.cwd, entry.as_deref(), json)
        }
        Some(Commands::Dev {
            entry,
            port,
            poll_interval_ms,
            ignore,
            fetch_types,
        }) => commands::dev::run(commands::dev::DevAction {
            cwd: config.cwd,
            entry,
            port,
            poll_interval_ms,
            ignore,
            fetch_types,
        }),
    }
}
