//! Catalog daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations
//! - `overlap`: single-run guard for the watch loop
//! - `sources`: JSON-lines primary store and directory asset source

pub mod cli;
pub mod commands;
pub mod overlap;
pub mod sources;

pub use cli::{Cli, Commands, ModeArg};
pub use commands::{
    build_engine, handle_page, handle_rebuild, handle_siblings, handle_stats, init_logging,
    load_settings, open_store, run_once, run_watch, show_status,
};
pub use overlap::{OverlapGuard, RunGuard};
pub use sources::{DirectoryAssetSource, JsonLinesPrimaryStore, MatchResult};
