//! Command implementations for the catalog daemon.
//!
//! Handles:
//! - rebuild / verify: build the engine from settings and run it once
//! - page / siblings / stats: read-only navigation queries
//! - status: last run record and keyspace sizes
//! - watch: scheduled changed-only runs with overlap protection

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::signal;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use catalog_indexing::{
    EngineConfig, EngineParts, ImageCrateResizer, IndexingError, LoggingProgressCallback,
    RebuildEngine, RebuildMode, RebuildOptions, RebuildSummary, StateStore,
    StaticThumbnailSettings,
};
use catalog_navigation::NavigationReader;
use catalog_storage::{IndexStore, ScanDirection};
use catalog_types::Settings;

use crate::cli::Cli;
use crate::overlap::OverlapGuard;
use crate::sources::{DirectoryAssetSource, JsonLinesPrimaryStore};

/// Batches between progress log lines
const PROGRESS_LOG_EVERY: u64 = 10;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(db_path) = &cli.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(records) = &cli.records {
        settings.records_path = records.clone();
    }
    if let Some(root) = &cli.assets_root {
        settings.assets_root = root.clone();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open (or create) the index database.
pub fn open_store(settings: &Settings) -> Result<Arc<IndexStore>> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = IndexStore::open(&db_path)
        .with_context(|| format!("Failed to open index at {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// Wire the engine to the file-backed collaborators named in `settings`.
pub fn build_engine(settings: &Settings, store: Arc<IndexStore>) -> Result<RebuildEngine> {
    let records = Settings::expand_path(&settings.records_path);
    let assets = Settings::expand_path(&settings.assets_root);
    info!(records = %records.display(), assets = %assets.display(), "Using primary store export");

    let parts = EngineParts {
        store,
        primary: Arc::new(JsonLinesPrimaryStore::new(records)),
        assets: Arc::new(DirectoryAssetSource::new(assets)),
        resizer: Arc::new(ImageCrateResizer),
        thumbnail_settings: Arc::new(StaticThumbnailSettings(settings.thumbnail.clone())),
    };
    let engine = RebuildEngine::new(parts, EngineConfig::from_settings(&settings.rebuild))
        .context("Failed to build rebuild engine")?;
    Ok(engine.with_progress(Arc::new(LoggingProgressCallback::new(PROGRESS_LOG_EVERY))))
}

/// Token cancelled on the first Ctrl+C. The current batch still completes.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping after the current batch");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });
    token
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the engine once and return its summary.
pub async fn run_once(
    settings: &Settings,
    mode: RebuildMode,
    options: RebuildOptions,
    cancel: CancellationToken,
) -> Result<RebuildSummary, IndexingError> {
    let store = open_store(settings).map_err(|e| IndexingError::StoreUnavailable(format!("{:#}", e)))?;
    let engine = build_engine(settings, store.clone())
        .map_err(|e| IndexingError::InvalidOptions(format!("{:#}", e)))?;
    let result = engine.run(mode, options, cancel).await;
    flush_store(&store);
    result
}

/// Flush memtables so a finished run survives an unclean shutdown.
fn flush_store(store: &IndexStore) {
    if let Err(e) = store.flush() {
        warn!(error = %e, "Failed to flush index");
    }
}

/// `rebuild` and `verify`: print the summary, including partial statistics
/// of an aborted run.
pub async fn handle_rebuild(
    settings: &Settings,
    mode: RebuildMode,
    options: RebuildOptions,
) -> Result<()> {
    match run_once(settings, mode, options, cancel_on_ctrl_c()).await {
        Ok(summary) => {
            print_json(&summary)?;
            if !summary.errors.is_empty() {
                warn!(count = summary.errors.len(), "Some records failed; rerun to retry them");
            }
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = e.partial() {
                print_json(partial)?;
            }
            Err(anyhow::Error::new(e).context(format!("{} run failed", mode)))
        }
    }
}

/// `page`
pub fn handle_page(
    settings: &Settings,
    cursor: Option<&str>,
    size: usize,
    backward: bool,
) -> Result<()> {
    let reader = NavigationReader::new(open_store(settings)?);
    let direction = if backward {
        ScanDirection::Backward
    } else {
        ScanDirection::Forward
    };
    let page = reader.page(cursor, size, direction)?;
    print_json(&page)
}

/// `siblings`
pub fn handle_siblings(settings: &Settings, id: &str) -> Result<()> {
    let reader = NavigationReader::new(open_store(settings)?);
    match reader.siblings(id)? {
        Some(siblings) => print_json(&siblings),
        None => anyhow::bail!("Record {} is not indexed", id),
    }
}

/// `stats`
pub fn handle_stats(settings: &Settings) -> Result<()> {
    let reader = NavigationReader::new(open_store(settings)?);
    print_json(&reader.statistics()?)
}

/// `status`
pub fn show_status(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let stats = store.get_stats()?;
    let last_run = StateStore::new(store).last_run()?;

    print_json(&serde_json::json!({
        "db_path": settings.expanded_db_path(),
        "keyspaces": {
            "ordered": stats.ordered_count,
            "members": stats.member_count,
            "thumbnails": stats.thumbnail_count,
            "states": stats.state_count,
        },
        "last_run": last_run,
    }))
}

/// `watch`: a changed-only run every `interval_secs` until Ctrl+C.
///
/// Ticks that arrive while a run is active are skipped.
pub async fn run_watch(settings: &Settings, interval_secs: u64) -> Result<()> {
    let store = open_store(settings)?;
    let engine = Arc::new(build_engine(settings, store.clone())?);
    let cancel = cancel_on_ctrl_c();
    let guard = OverlapGuard::new();
    let mut runs = JoinSet::new();

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs, "Watching for changes");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(run) = guard.try_acquire() {
                    let engine = engine.clone();
                    let token = cancel.child_token();
                    runs.spawn(async move {
                        let _run = run;
                        match engine
                            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), token)
                            .await
                        {
                            Ok(summary) => info!(
                                rebuilt = summary.rebuilt,
                                skipped = summary.skipped,
                                errors = summary.errors.len(),
                                "Scheduled rebuild finished"
                            ),
                            Err(e) => error!(error = %e, "Scheduled rebuild failed"),
                        }
                    });
                } else {
                    info!("Previous rebuild still running, skipping tick");
                }
            }
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Scheduled rebuild task panicked");
                }
            }
        }
    }

    while runs.join_next().await.is_some() {}
    flush_store(&store);
    info!("Watch stopped");
    Ok(())
}
