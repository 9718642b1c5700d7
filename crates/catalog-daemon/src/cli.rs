//! CLI argument parsing for the catalog daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand, ValueEnum};

use catalog_indexing::RebuildMode;

/// Collection index maintenance
///
/// Rebuilds, verifies and browses the read-optimized collection index.
#[derive(Parser, Debug)]
#[command(name = "catalog-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/collection-index/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override index database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Override the JSON-lines primary store export
    #[arg(long, global = true)]
    pub records: Option<String>,

    /// Override the preview asset root
    #[arg(long, global = true)]
    pub assets_root: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Rebuild mode as accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeArg {
    #[default]
    ChangedOnly,
    Verify,
    Full,
    ForceRebuildAll,
}

impl From<ModeArg> for RebuildMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::ChangedOnly => RebuildMode::ChangedOnly,
            ModeArg::Verify => RebuildMode::Verify,
            ModeArg::Full => RebuildMode::Full,
            ModeArg::ForceRebuildAll => RebuildMode::ForceRebuildAll,
        }
    }
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the rebuild engine once
    Rebuild {
        #[arg(short, long, value_enum, default_value_t = ModeArg::ChangedOnly)]
        mode: ModeArg,

        /// Classify and count without writing
        #[arg(long)]
        dry_run: bool,

        /// Leave cached thumbnails untouched
        #[arg(long)]
        skip_thumbnails: bool,
    },

    /// Check primary store and index against each other and repair drift
    Verify {
        /// Report drift without repairing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print one page of record ids in navigation order
    Page {
        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,

        /// Page size
        #[arg(short, long, default_value = "20")]
        size: usize,

        /// Read the page before the cursor
        #[arg(long)]
        backward: bool,
    },

    /// Print the previous and next record around an id
    Siblings {
        /// Record id
        id: String,
    },

    /// Print index aggregates
    Stats,

    /// Show the last run and keyspace sizes
    Status,

    /// Run changed-only rebuilds on an interval until Ctrl+C
    Watch {
        /// Override rebuild.watch_interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}
