use crate::catalog::DEFAULT_TTL;
use crate::channels::DEFAULT_CAPACITY;
use crate::cli::CliArgs;
use crate::logs::DEFAULT_TAIL_LINES;
use crate::notify::DEFAULT_NOTIFICATION_TTL;
use crate::watch::DEFAULT_POLL_INTERVAL;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TraverseConfig {
    pub source: Option<String>,
    pub poll_interval: Duration,
    pub log_tail_lines: i64,
    pub notification_ttl: Duration,
    pub update_capacity: usize,
    pub export_dir: PathBuf,
    pub log_dir: PathBuf,
    pub catalog_ttl: Duration,
    pub refresh_catalog: bool,
    pub log_filter: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TraverseConfigFile {
    #[serde(alias = "poll_interval")]
    poll_interval_secs: u64,
    #[serde(alias = "tail_lines")]
    log_tail_lines: i64,
    notification_secs: u64,
    update_capacity: usize,
    export_dir: PathBuf,
    log_dir: PathBuf,
    catalog_ttl_hours: u64,
}

impl Default for TraverseConfigFile {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            log_tail_lines: DEFAULT_TAIL_LINES,
            notification_secs: DEFAULT_NOTIFICATION_TTL.as_secs(),
            update_capacity: DEFAULT_CAPACITY,
            export_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            catalog_ttl_hours: DEFAULT_TTL.as_secs() / (60 * 60),
        }
    }
}

impl TraverseConfig {
    /// File values over defaults, command line over both.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let path = discover_config_path();
        let file = match &path {
            Some(path) => read_config_file(path)?,
            None => TraverseConfigFile::default(),
        };
        Ok(Self::layer(path, file, args))
    }

    fn layer(path: Option<PathBuf>, file: TraverseConfigFile, args: &CliArgs) -> Self {
        Self {
            source: path.map(|path| path.display().to_string()),
            poll_interval: Duration::from_secs(
                args.poll_interval_secs
                    .unwrap_or(file.poll_interval_secs)
                    .max(1),
            ),
            log_tail_lines: args.tail_lines.unwrap_or(file.log_tail_lines).max(1),
            notification_ttl: Duration::from_secs(file.notification_secs),
            update_capacity: file.update_capacity.max(1),
            export_dir: args.export_dir.clone().unwrap_or(file.export_dir),
            log_dir: args.log_dir.clone().unwrap_or(file.log_dir),
            catalog_ttl: Duration::from_secs(file.catalog_ttl_hours * 60 * 60),
            refresh_catalog: args.refresh_catalog,
            log_filter: args.log_filter.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<TraverseConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(TraverseConfigFile::default());
    }
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("TRAVERSE_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("traverse.yaml"),
        PathBuf::from("traverse.yml"),
        PathBuf::from(".traverse.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(&home).join(".config/traverse/config.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}
