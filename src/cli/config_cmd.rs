//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration from `HD_PAGER_*` environment variables, or from
//! a TOML file when one is given.

use std::path::Path;

use crate::config::{self, ConfigError, EffectiveConfig, EnvConfig};

fn load(file: Option<&Path>) -> Result<EnvConfig, ConfigError> {
    match file {
        Some(path) => config::load_file(path),
        None => Ok(config::load()),
    }
}

/// Print effective config as key-value pairs to stdout.
pub fn run_show(file: Option<&Path>) -> i32 {
    match load(file) {
        Ok(cfg) => {
            print_config(&cfg.effective_config());
            0
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            2
        }
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EnvConfig::default().with_floors().effective_config());
}

/// Problems that leave the manager usable but probably misconfigured.
pub fn validate(cfg: &EnvConfig) -> Vec<String> {
    let bm = &cfg.buffer_manager;
    let t = &bm.thresholds;
    let mut warnings = Vec::new();

    if !(t.moderate <= t.paging && t.paging <= t.high && t.high <= t.very_high) {
        warnings.push(format!(
            "pressure thresholds are not ascending: moderate={} paging={} high={} very_high={}",
            t.moderate, t.paging, t.high, t.very_high
        ));
    }
    if t.paging <= 0.0 {
        warnings.push("paging threshold <= 0; every sweep will page".to_string());
    }
    if bm.max_page_file_size > (bm.scene_memory_limit as u64).saturating_add(bm.renderer_memory_limit as u64)
        && bm.max_page_files == 1
    {
        warnings.push("single page file larger than both memory tiers combined".to_string());
    }
    if let Some(dir) = &bm.page_file_directory {
        if dir.exists() && !dir.is_dir() {
            warnings.push(format!("HD_PAGER_PAGE_DIR ({}) is not a directory", dir.display()));
        }
    }
    if cfg.sweeper.crawl_percentage == 0.0 {
        warnings.push("HD_PAGER_CRAWL_PERCENT is 0; the sweeper will never evict".to_string());
    }
    warnings
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the file is unreadable.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let cfg = match load(file) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return 2;
        }
    };

    let warnings = validate(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in config_lines(cfg) {
        println!("{}={}", key, value);
    }
}

fn config_lines(cfg: &EffectiveConfig) -> Vec<(&'static str, String)> {
    let dir = cfg
        .page_file_directory
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    vec![
        ("HD_PAGER_PAGE_DIR", dir),
        ("HD_PAGER_SCENE_LIMIT", cfg.scene_memory_limit.to_string()),
        ("HD_PAGER_RENDERER_LIMIT", cfg.renderer_memory_limit.to_string()),
        ("HD_PAGER_AGE_LIMIT", cfg.age_limit.to_string()),
        ("HD_PAGER_THREADS", cfg.num_threads.to_string()),
        ("HD_PAGER_PAGE_FILE_SIZE", cfg.max_page_file_size.to_string()),
        ("HD_PAGER_MAX_PAGE_FILES", cfg.max_page_files.to_string()),
        ("HD_PAGER_STRATEGY", cfg.paging_strategy.to_string()),
        ("HD_PAGER_SELECTION", cfg.selection_strategy.to_string()),
        ("HD_PAGER_SWEEP_INTERVAL_MS", cfg.sweep_interval_ms.to_string()),
        ("HD_PAGER_CRAWL_PERCENT", cfg.crawl_percentage.to_string()),
        ("HD_PAGER_LOG_LEVEL", cfg.log_level.clone()),
        ("HD_PAGER_LOG_FORMAT", format!("{:?}", cfg.log_format).to_lowercase()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_passes_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        assert_eq!(run_validate(None), 0, "default config should pass validation");
    }

    #[test]
    fn test_validate_flags_unordered_thresholds() {
        let mut cfg = EnvConfig::default();
        cfg.buffer_manager.thresholds.high = 0.5;
        let warnings = validate(&cfg);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not ascending"));
    }

    #[test]
    fn test_validate_flags_file_as_page_dir() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = EnvConfig::default();
        cfg.buffer_manager.page_file_directory = Some(file.path().to_path_buf());
        assert!(validate(&cfg).iter().any(|w| w.contains("not a directory")));
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_validate(Some(&dir.path().join("nope.toml"))), 2);
    }

    #[test]
    fn test_config_lines_cover_every_variable() {
        let cfg = EnvConfig::default().effective_config();
        let lines = config_lines(&cfg);
        for key in crate::config::tests::ENV_KEYS {
            assert!(lines.iter().any(|(k, _)| k == key), "missing {}", key);
        }
        let strategy = lines.iter().find(|(k, _)| *k == "HD_PAGER_STRATEGY").unwrap();
        assert_eq!(strategy.1, "hybrid");
    }
}
