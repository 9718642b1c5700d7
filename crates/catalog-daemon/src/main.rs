//! Catalog Daemon
//!
//! Maintains the read-optimized collection index.
//!
//! # Usage
//!
//! ```bash
//! catalog-daemon rebuild [--mode changed-only|verify|full|force-rebuild-all] [--dry-run] [--skip-thumbnails]
//! catalog-daemon verify [--dry-run]
//! catalog-daemon page [--cursor C] [--size N] [--backward]
//! catalog-daemon siblings <ID>
//! catalog-daemon stats
//! catalog-daemon status
//! catalog-daemon watch [--interval-secs N]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/collection-index/config.toml)
//! 3. Environment variables (CATALOG_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use catalog_daemon::{
    handle_page, handle_rebuild, handle_siblings, handle_stats, init_logging, load_settings,
    run_watch, show_status, Cli, Commands,
};
use catalog_indexing::{RebuildMode, RebuildOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Rebuild {
            mode,
            dry_run,
            skip_thumbnails,
        } => {
            let options = RebuildOptions {
                dry_run,
                skip_thumbnail_caching: skip_thumbnails,
            };
            handle_rebuild(&settings, mode.into(), options).await?;
        }
        Commands::Verify { dry_run } => {
            let options = RebuildOptions {
                dry_run,
                ..Default::default()
            };
            handle_rebuild(&settings, RebuildMode::Verify, options).await?;
        }
        Commands::Page {
            cursor,
            size,
            backward,
        } => {
            handle_page(&settings, cursor.as_deref(), size, backward)?;
        }
        Commands::Siblings { id } => {
            handle_siblings(&settings, &id)?;
        }
        Commands::Stats => {
            handle_stats(&settings)?;
        }
        Commands::Status => {
            show_status(&settings)?;
        }
        Commands::Watch { interval_secs } => {
            let interval = interval_secs.unwrap_or(settings.rebuild.watch_interval_secs);
            run_watch(&settings, interval).await?;
        }
    }

    Ok(())
}
