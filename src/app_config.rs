//! Application configuration loading from TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use harvester_core::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
    REQUEST_TIMEOUT_SECS,
};
use harvester_core::{DEFAULT_BASE_URL, DownloaderConfig, RetryPolicy, find_category};
use serde::Deserialize;

/// Config locations tried, in order, when no `--config` is given.
const DEFAULT_CONFIG_CANDIDATES: &[&str] = &["configs/config.toml", "config.toml"];

/// Default monitor poll interval (one hour).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;

/// Default timeout for a monitor poll.
pub const DEFAULT_MONITOR_TIMEOUT_SECS: u64 = 30;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// `[crawler]` table.
    pub crawler: CrawlerSection,
    /// `[monitor]` table.
    pub monitor: MonitorSection,
    /// `[logging]` table.
    pub logging: LoggingSection,
}

/// Download sweep settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerSection {
    pub base_url: Option<String>,
    pub download_path: Option<PathBuf>,
    pub max_concurrent_downloads: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub selected_categories: Option<Vec<String>>,
}

/// Change monitor settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSection {
    /// Page to watch; defaults to the crawler base URL.
    pub url: Option<String>,
    pub check_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        let crawler = &self.crawler;

        if let Some(concurrency) = crawler.max_concurrent_downloads
            && !(1..=100).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `crawler.max_concurrent_downloads`: {concurrency}. Expected range: 1..=100"
            );
        }

        if let Some(attempts) = crawler.retry_attempts
            && !(1..=20).contains(&attempts)
        {
            bail!(
                "Invalid config value for `crawler.retry_attempts`: {attempts}. Expected range: 1..=20"
            );
        }

        if let Some(delay) = crawler.retry_delay_secs
            && delay > 3600
        {
            bail!(
                "Invalid config value for `crawler.retry_delay_secs`: {delay}. Expected range: 0..=3600"
            );
        }

        validate_timeout_secs("crawler.request_timeout_secs", crawler.request_timeout_secs)?;
        validate_timeout_secs("monitor.timeout_secs", self.monitor.timeout_secs)?;

        if let Some(interval) = self.monitor.check_interval_secs
            && interval == 0
        {
            bail!("Invalid config value for `monitor.check_interval_secs`: 0. Expected at least 1");
        }

        validate_url("crawler.base_url", crawler.base_url.as_deref())?;
        validate_url("monitor.url", self.monitor.url.as_deref())?;

        for id in crawler.selected_categories.iter().flatten() {
            if find_category(id).is_none() {
                bail!("Unknown category in `crawler.selected_categories`: '{id}'");
            }
        }

        if let Some(level) = &self.logging.level
            && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
        {
            bail!(
                "Invalid config value for `logging.level`: '{level}'. Expected one of: {}",
                LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    /// Builds the downloader settings, filling in defaults.
    #[must_use]
    pub fn downloader_config(&self) -> DownloaderConfig {
        let crawler = &self.crawler;
        let retry_delay = crawler
            .retry_delay_secs
            .map_or(DEFAULT_RETRY_DELAY, Duration::from_secs);

        DownloaderConfig {
            base_url: self.base_url().to_string(),
            download_path: crawler
                .download_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            max_concurrent_downloads: crawler
                .max_concurrent_downloads
                .unwrap_or(DEFAULT_CONCURRENCY),
            retry_policy: RetryPolicy::new(
                crawler.retry_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                retry_delay,
            ),
            selected_categories: crawler.selected_categories.clone().unwrap_or_default(),
        }
    }

    /// Base URL category files are published under.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.crawler.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Request timeout for downloads, in seconds.
    #[must_use]
    pub fn request_timeout_secs(&self) -> u64 {
        self.crawler
            .request_timeout_secs
            .unwrap_or(REQUEST_TIMEOUT_SECS)
    }

    /// Page the change monitor polls.
    #[must_use]
    pub fn monitor_url(&self) -> &str {
        self.monitor.url.as_deref().unwrap_or_else(|| self.base_url())
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(
            self.monitor
                .check_interval_secs
                .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
        )
    }

    /// Monitor poll timeout, in seconds.
    #[must_use]
    pub fn monitor_timeout_secs(&self) -> u64 {
        self.monitor
            .timeout_secs
            .unwrap_or(DEFAULT_MONITOR_TIMEOUT_SECS)
    }

    /// Connect timeout shared by both HTTP clients.
    #[must_use]
    pub fn connect_timeout_secs(&self) -> u64 {
        CONNECT_TIMEOUT_SECS.min(self.monitor_timeout_secs())
    }

    #[must_use]
    pub fn log_level(&self) -> Option<String> {
        self.logging.level.as_ref().map(|l| l.to_ascii_lowercase())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

fn validate_url(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    url::Url::parse(value)
        .with_context(|| format!("Invalid config value for `{field}`: '{value}' is not a URL"))?;
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Path the config was read from, if any.
    pub path: Option<PathBuf>,
    /// Parsed and validated config (defaults when no file was found).
    pub config: FileConfig,
}

/// Resolves which config file to read.
///
/// Priority:
/// 1. `explicit` (must exist)
/// 2. `<base_dir>/configs/config.toml`
/// 3. `<base_dir>/config.toml`
pub fn resolve_config_path(explicit: Option<&Path>, base_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file '{}' does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    Ok(DEFAULT_CONFIG_CANDIDATES
        .iter()
        .map(|candidate| base_dir.join(candidate))
        .find(|path| path.is_file()))
}

/// Loads config from `explicit` or the default locations under the working
/// directory, falling back to built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let base_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let Some(path) = resolve_config_path(explicit, &base_dir)? else {
        return Ok(LoadedConfig::default());
    };

    let config = load_file_config(&path)?;
    Ok(LoadedConfig {
        path: Some(path),
        config,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}
