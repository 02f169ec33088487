//! sprintsync configuration file handling
//!
//! Loads and manages the ~/.config/sprintsync/config.yaml file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page size the Agile REST API honours for listing calls
pub const MAX_PAGE_SIZE: u32 = 50;

/// Widest accepted recent-closed window, in days
pub const MAX_RECENT_CLOSED_DAYS: i64 = 36_500;

/// Default per-request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Sync engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Items requested per page (at most 50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard cap on pages fetched per listing and base-URL candidate
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Concurrent per-sprint workers within one sync branch
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How far back a closed sprint counts as "recently closed"
    #[serde(default = "default_recent_closed_days")]
    pub recent_closed_days: i64,

    /// Non-forced syncs of a branch are skipped within this window (0 disables)
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,

    /// Request timeout used when the user's settings do not carry one
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_max_pages() -> u32 {
    5
}

fn default_workers() -> usize {
    4
}

fn default_recent_closed_days() -> i64 {
    14
}

fn default_min_interval_secs() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            workers: default_workers(),
            recent_closed_days: default_recent_closed_days(),
            min_interval_secs: default_min_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Freshness window, or `None` when skipping is disabled
    pub fn min_interval(&self) -> Option<Duration> {
        (self.min_interval_secs > 0).then(|| Duration::from_secs(self.min_interval_secs))
    }
}

/// Reporting settings for the team-bounded sprint view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Lower bound applied to a requested per-team cap
    #[serde(default = "default_min_per_team")]
    pub min_per_team: usize,

    /// Upper bound applied to a requested per-team cap
    #[serde(default = "default_max_per_team")]
    pub max_per_team: usize,

    /// Cap used when none is requested
    #[serde(default = "default_per_team")]
    pub default_per_team: usize,
}

fn default_min_per_team() -> usize {
    1
}

fn default_max_per_team() -> usize {
    20
}

fn default_per_team() -> usize {
    3
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            min_per_team: default_min_per_team(),
            max_per_team: default_max_per_team(),
            default_per_team: default_per_team(),
        }
    }
}

impl ReportConfig {
    /// Clamp a requested per-team cap into the configured bounds
    pub fn clamp_per_team(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_per_team)
            .clamp(self.min_per_team, self.max_per_team.max(self.min_per_team))
    }
}

/// sprintsync configuration
///
/// Represents the complete ~/.config/sprintsync/config.yaml file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database holding sprints, issues and integration settings
    #[serde(default = "default_database_path")]
    pub database: PathBuf,

    /// Jira base URL used when neither an admin override nor a user URL is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_base_url: Option<String>,

    /// Sync engine settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Reporting settings
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_database_path() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("sprintsync");
    path.push("sprintsync.db");
    path
}

impl AppConfig {
    /// Create a configuration with every setting at its default
    pub fn new() -> Self {
        Self {
            database: default_database_path(),
            default_base_url: None,
            sync: SyncConfig::default(),
            report: ReportConfig::default(),
        }
    }

    /// Load configuration from the default path, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::new());
        }
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::SprintSyncError::Other(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading sprintsync configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            database = %config.database.display(),
            page_size = config.sync.page_size,
            max_pages = config.sync.max_pages,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving sprintsync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/sprintsync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("sprintsync");
        path.push("config.yaml");
        path
    }

    /// Request timeout used when the user's settings carry none
    pub fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.request_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}
