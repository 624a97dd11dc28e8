//! TOML configuration files.

use std::time::Duration;

use hd_pager::config::{self, ConfigError, MIN_PAGE_FILE_SIZE};
use hd_pager::paging::{PagingStrategyKind, SelectionStrategy};
use hd_pager::telemetry::LogFormat;

fn write_config(dir: &tempfile::TempDir, text: &str) -> std::path::PathBuf {
    let path = dir.path().join("pager.toml");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[buffer_manager]
scene_memory_limit = 1048576
age_limit = 7
paging_strategy = "pressure"
selection_strategy = "largest_first"

[buffer_manager.thresholds]
paging = 0.7

[sweeper]
interval = 250
crawl_percentage = 25.0

[log]
level = "debug"
format = "pretty"
"#,
    );

    let cfg = config::load_file(&path).unwrap();
    assert_eq!(cfg.buffer_manager.scene_memory_limit, 1_048_576);
    assert_eq!(cfg.buffer_manager.age_limit, 7);
    assert_eq!(cfg.buffer_manager.paging_strategy, PagingStrategyKind::Pressure);
    assert_eq!(cfg.buffer_manager.selection_strategy, SelectionStrategy::LargestFirst);
    assert!((cfg.buffer_manager.thresholds.paging - 0.7).abs() < 1e-6);
    assert!((cfg.buffer_manager.thresholds.high - 0.9).abs() < 1e-6);
    assert_eq!(cfg.sweeper.interval, Duration::from_millis(250));
    assert_eq!(cfg.log.format, LogFormat::Pretty);
    assert_eq!(cfg.log.level, "debug");
}

#[test]
fn floors_apply_to_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[buffer_manager]
scene_memory_limit = 0
max_page_file_size = 10

[sweeper]
interval = 0
crawl_percentage = 400.0
"#,
    );

    let cfg = config::load_file(&path).unwrap();
    assert_eq!(cfg.buffer_manager.scene_memory_limit, 1);
    assert_eq!(cfg.buffer_manager.max_page_file_size, MIN_PAGE_FILE_SIZE);
    assert_eq!(cfg.sweeper.interval, Duration::from_millis(1));
    assert_eq!(cfg.sweeper.crawl_percentage, 100.0);
}

#[test]
fn missing_and_malformed_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(config::load_file(&missing), Err(ConfigError::Read { .. })));

    let bad = write_config(&dir, "[buffer_manager]\nage_limit = \"soon\"\n");
    assert!(matches!(config::load_file(&bad), Err(ConfigError::Parse { .. })));
}

#[test]
fn effective_config_serializes() {
    let cfg = config::EnvConfig::default();
    let json = serde_json::to_value(cfg.effective_config()).unwrap();
    assert_eq!(json["paging_strategy"], "hybrid");
    assert_eq!(json["selection_strategy"], "lru");
    assert_eq!(json["log_format"], "json");
}
