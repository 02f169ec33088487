//! Configuration system
//!
//! Loads ~/.config/sprintsync/config.yaml with support for:
//! - Database location
//! - A default Jira base URL
//! - Sync paging, concurrency and freshness settings
//! - Report bounds
//!
//! Per-user Jira integration settings live in the database, not in this file.

mod app_config;
mod integration;
pub mod validation;

pub use app_config::{
    AppConfig, ReportConfig, SyncConfig, DEFAULT_REQUEST_TIMEOUT_MS, MAX_PAGE_SIZE,
    MAX_RECENT_CLOSED_DAYS,
};
pub use integration::IntegrationSettings;
pub use validation::{validate_config, validate_config_result, ValidationError};
