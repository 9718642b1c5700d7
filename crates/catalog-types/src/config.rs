//! Configuration loading for the collection index.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/collection-index/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CatalogError;
use crate::thumbnail::ThumbnailFormat;

const APP_NAME: &str = "collection-index";

/// Batch sizing for rebuild runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSettings {
    /// Records per batch; memory is reclaimed between batches
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum records in flight within one batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Interval between scheduled incremental runs (`watch` command)
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    default_batch_size()
}

fn default_watch_interval() -> u64 {
    300
}

impl Default for RebuildSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

impl RebuildSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be > 0".to_string());
        }
        if self.watch_interval_secs == 0 {
            return Err("watch_interval_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Thumbnail resize thresholds and output parameters.
///
/// Thresholds are strict: an asset exactly at `max_width` x `max_height`
/// or exactly `max_bytes` long is cached as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSettings {
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Bounding box of resized output
    #[serde(default = "default_target_dimension")]
    pub target_width: u32,

    #[serde(default = "default_target_dimension")]
    pub target_height: u32,

    #[serde(default)]
    pub format: ThumbnailFormat,

    /// Encoder quality, 1-100
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// How long a settings snapshot is reused before being re-read
    #[serde(default = "default_settings_ttl")]
    pub settings_ttl_secs: u64,
}

fn default_max_dimension() -> u32 {
    400
}

fn default_max_bytes() -> u64 {
    500 * 1024
}

fn default_target_dimension() -> u32 {
    320
}

fn default_quality() -> u8 {
    80
}

fn default_settings_ttl() -> u64 {
    300
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            max_bytes: default_max_bytes(),
            target_width: default_target_dimension(),
            target_height: default_target_dimension(),
            format: ThumbnailFormat::default(),
            quality: default_quality(),
            settings_ttl_secs: default_settings_ttl(),
        }
    }
}

impl ThumbnailSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err("max_width and max_height must be > 0".to_string());
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err("target_width and target_height must be > 0".to_string());
        }
        if !(1..=100).contains(&self.quality) {
            return Err(format!("quality must be 1-100, got {}", self.quality));
        }
        if self.format == ThumbnailFormat::Original {
            return Err("format must be jpeg, png or webp".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB index directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON-lines export of the primary store
    #[serde(default = "default_records_path")]
    pub records_path: String,

    /// Root directory preview asset paths are resolved against
    #[serde(default = "default_assets_root")]
    pub assets_root: String,

    #[serde(default)]
    pub rebuild: RebuildSettings,

    #[serde(default)]
    pub thumbnail: ThumbnailSettings,
}

fn data_dir_path(name: &str) -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join(name))
        .unwrap_or_else(|| PathBuf::from(".").join(name))
        .to_string_lossy()
        .to_string()
}

fn default_db_path() -> String {
    data_dir_path("index-db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_records_path() -> String {
    data_dir_path("records.jsonl")
}

fn default_assets_root() -> String {
    data_dir_path("assets")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            records_path: default_records_path(),
            assets_root: default_assets_root(),
            rebuild: RebuildSettings::default(),
            thumbnail: ThumbnailSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/collection-index/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (CATALOG_*, nested with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, CatalogError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| CatalogError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| CatalogError::Config(e.to_string()))?
            .set_default("records_path", default_records_path())
            .map_err(|e| CatalogError::Config(e.to_string()))?
            .set_default("assets_root", default_assets_root())
            .map_err(|e| CatalogError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CATALOG_DB_PATH, CATALOG_THUMBNAIL__MAX_WIDTH, ...
        builder = builder.add_source(
            Environment::with_prefix("CATALOG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| CatalogError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| CatalogError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), CatalogError> {
        self.rebuild
            .validate()
            .map_err(|e| CatalogError::Config(format!("rebuild: {}", e)))?;
        self.thumbnail
            .validate()
            .map_err(|e| CatalogError::Config(format!("thumbnail: {}", e)))?;
        Ok(())
    }

    /// Expand ~ in a configured path
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Index directory with ~ expanded
    pub fn expanded_db_path(&self) -> PathBuf {
        Self::expand_path(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.rebuild.batch_size, 100);
        assert_eq!(settings.rebuild.concurrency, 100);
        assert_eq!(settings.thumbnail.max_width, 400);
        assert_eq!(settings.thumbnail.max_height, 400);
        assert_eq!(settings.thumbnail.max_bytes, 512_000);
        assert_eq!(settings.thumbnail.settings_ttl_secs, 300);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.rebuild.batch_size, 100);
        assert_eq!(settings.thumbnail.format, ThumbnailFormat::Jpeg);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("catalog-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("index.toml");
        std::fs::write(
            &path,
            "db_path = \"/tmp/idx\"\n[thumbnail]\nmax_width = 640\nformat = \"webp\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.db_path, "/tmp/idx");
        assert_eq!(settings.thumbnail.max_width, 640);
        assert_eq!(settings.thumbnail.max_height, 400);
        assert_eq!(settings.thumbnail.format, ThumbnailFormat::Webp);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rebuild_validation() {
        let mut rebuild = RebuildSettings::default();
        assert!(rebuild.validate().is_ok());
        rebuild.batch_size = 0;
        assert!(rebuild.validate().is_err());
    }

    #[test]
    fn test_thumbnail_validation() {
        let mut thumb = ThumbnailSettings::default();
        assert!(thumb.validate().is_ok());

        thumb.quality = 0;
        assert!(thumb.validate().is_err());

        thumb.quality = 80;
        thumb.format = ThumbnailFormat::Original;
        assert!(thumb.validate().is_err());
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(Settings::expand_path("/var/idx"), PathBuf::from("/var/idx"));
    }
}
