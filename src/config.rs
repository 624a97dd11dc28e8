//! Configuration loading from environment variables and TOML files.
//!
//! Values are read from `HD_PAGER_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HD_PAGER_PAGE_DIR` | temp dir | Page-file directory |
//! | `HD_PAGER_SCENE_LIMIT` | 2147483648 | Scene memory limit (bytes) |
//! | `HD_PAGER_RENDERER_LIMIT` | 1073741824 | Renderer memory limit (bytes) |
//! | `HD_PAGER_AGE_LIMIT` | 100 | Frames before a buffer is over age |
//! | `HD_PAGER_THREADS` | 0 | Async worker threads (0 = auto) |
//! | `HD_PAGER_PAGE_FILE_SIZE` | 1932735283 | Page-file size ceiling (bytes) |
//! | `HD_PAGER_MAX_PAGE_FILES` | 0 | Page-file cap (0 = unlimited) |
//! | `HD_PAGER_STRATEGY` | hybrid | age, pressure, conservative, hybrid |
//! | `HD_PAGER_SELECTION` | lru | lru, fifo, oldest_first, largest_first |
//! | `HD_PAGER_SWEEP_INTERVAL_MS` | 500 | Background sweep interval |
//! | `HD_PAGER_CRAWL_PERCENT` | 10 | Share of buffers per sweep |
//! | `HD_PAGER_LOG_LEVEL` | info | Log filter directive |
//! | `HD_PAGER_LOG_FORMAT` | json | json or pretty |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paging::{BufferManagerConfig, PagingStrategyKind, SelectionStrategy, SweeperConfig};
use crate::telemetry::{LogConfig, LogFormat};

/// Smallest accepted page-file ceiling.
pub const MIN_PAGE_FILE_SIZE: u64 = 4096;

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub page_file_directory: Option<PathBuf>,
    pub scene_memory_limit: usize,
    pub renderer_memory_limit: usize,
    pub age_limit: u64,
    pub num_threads: usize,
    pub max_page_file_size: u64,
    pub max_page_files: usize,
    pub paging_strategy: PagingStrategyKind,
    pub selection_strategy: SelectionStrategy,
    pub sweep_interval_ms: u64,
    pub crawl_percentage: f32,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// All configuration, from the environment or a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub buffer_manager: BufferManagerConfig,
    pub sweeper: SweeperConfig,
    pub log: LogConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    parse_env(key, default)
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    parse_env(key, default)
}

/// Parse any `FromStr` env var, returning `default` on missing or invalid.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn load_buffer_manager_config() -> BufferManagerConfig {
    let defaults = BufferManagerConfig::default();
    let page_file_directory = std::env::var("HD_PAGER_PAGE_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    BufferManagerConfig {
        page_file_directory,
        scene_memory_limit: parse_usize("HD_PAGER_SCENE_LIMIT", defaults.scene_memory_limit),
        renderer_memory_limit: parse_usize("HD_PAGER_RENDERER_LIMIT", defaults.renderer_memory_limit),
        age_limit: parse_u64("HD_PAGER_AGE_LIMIT", defaults.age_limit),
        num_threads: parse_usize("HD_PAGER_THREADS", defaults.num_threads),
        max_page_file_size: parse_u64("HD_PAGER_PAGE_FILE_SIZE", defaults.max_page_file_size),
        max_page_files: parse_usize("HD_PAGER_MAX_PAGE_FILES", defaults.max_page_files),
        paging_strategy: parse_env("HD_PAGER_STRATEGY", defaults.paging_strategy),
        selection_strategy: parse_env("HD_PAGER_SELECTION", defaults.selection_strategy),
        thresholds: defaults.thresholds,
    }
}

fn load_sweeper_config() -> SweeperConfig {
    let defaults = SweeperConfig::default();
    let interval = parse_u64("HD_PAGER_SWEEP_INTERVAL_MS", defaults.interval.as_millis() as u64);
    SweeperConfig {
        interval: Duration::from_millis(interval),
        crawl_percentage: parse_env("HD_PAGER_CRAWL_PERCENT", defaults.crawl_percentage),
        ..defaults
    }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    LogConfig {
        level: std::env::var("HD_PAGER_LOG_LEVEL").unwrap_or(defaults.level),
        format: parse_env("HD_PAGER_LOG_FORMAT", defaults.format),
        output_path: defaults.output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        buffer_manager: load_buffer_manager_config(),
        sweeper: load_sweeper_config(),
        log: load_log_config(),
    }
    .with_floors()
}

/// Load configuration from a TOML file. Missing fields take defaults.
pub fn load_file(path: impl AsRef<Path>) -> Result<EnvConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: EnvConfig = toml::from_str(&text)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    Ok(config.with_floors())
}

impl EnvConfig {
    /// Clamp values that would make the manager unusable.
    pub fn with_floors(mut self) -> Self {
        let bm = &mut self.buffer_manager;
        bm.scene_memory_limit = bm.scene_memory_limit.max(1);
        bm.renderer_memory_limit = bm.renderer_memory_limit.max(1);
        bm.max_page_file_size = bm.max_page_file_size.max(MIN_PAGE_FILE_SIZE);

        let pct = self.sweeper.crawl_percentage;
        self.sweeper.crawl_percentage = if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
        self.sweeper.interval = self.sweeper.interval.max(Duration::from_millis(1));
        self
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let bm = &self.buffer_manager;
        EffectiveConfig {
            page_file_directory: bm.page_file_directory.clone(),
            scene_memory_limit: bm.scene_memory_limit,
            renderer_memory_limit: bm.renderer_memory_limit,
            age_limit: bm.age_limit,
            num_threads: bm.num_threads,
            max_page_file_size: bm.max_page_file_size,
            max_page_files: bm.max_page_files,
            paging_strategy: bm.paging_strategy,
            selection_strategy: bm.selection_strategy,
            sweep_interval_ms: self.sweeper.interval.as_millis() as u64,
            crawl_percentage: self.sweeper.crawl_percentage,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}
