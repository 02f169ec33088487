//! Local store
//!
//! The sync engine only talks to storage through [`SprintStore`]. Every upsert
//! is atomic per row and keyed by the upstream identifier, which is written
//! once and never changed afterwards.
//!
//! [`SqliteStore`] is the bundled implementation.

mod sqlite;

pub use sqlite::{SqliteStore, StoreConfig, StoreStats};

use crate::config::IntegrationSettings;
use crate::model::{
    ConnectionStatus, NewIssue, SprintRecord, SprintSnapshot, StoredIssue, StoredSprint, Upserted,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage operations used by sync and reporting
#[async_trait]
pub trait SprintStore: Send + Sync {
    /// Jira settings saved for a user (empty when none were saved)
    async fn integration_settings(&self, user_id: &str) -> Result<IntegrationSettings>;

    /// Replace the saved Jira settings for a user
    async fn save_integration_settings(
        &self,
        user_id: &str,
        settings: &IntegrationSettings,
    ) -> Result<()>;

    /// Admin-level base URL override, if one is set
    async fn admin_base_url(&self) -> Result<Option<String>>;

    /// Set or clear the admin-level base URL override
    async fn set_admin_base_url(&self, url: Option<&str>) -> Result<()>;

    /// Insert a sprint or update its name, dates and status
    async fn upsert_sprint(&self, sprint: &SprintRecord) -> Result<Upserted<StoredSprint>>;

    /// Insert an issue or update it in place without changing its sprint
    async fn upsert_issue(&self, issue: &NewIssue) -> Result<Upserted<StoredIssue>>;

    async fn sprint_by_external_id(&self, external_id: &str) -> Result<Option<StoredSprint>>;

    async fn issue_by_external_id(&self, external_id: &str) -> Result<Option<StoredIssue>>;

    async fn issues_for_sprint(&self, sprint_id: i64) -> Result<Vec<StoredIssue>>;

    /// All sprints, most recent end date first
    async fn sprint_snapshots(&self) -> Result<Vec<SprintSnapshot>>;

    async fn record_connection_status(&self, user_id: &str, status: &ConnectionStatus)
        -> Result<()>;

    async fn connection_status(&self, user_id: &str) -> Result<Option<ConnectionStatus>>;

    /// Time of the last successful sync of a branch for a user
    async fn last_sync(&self, user_id: &str, branch: &str) -> Result<Option<DateTime<Utc>>>;

    async fn mark_synced(&self, user_id: &str, branch: &str, at: DateTime<Utc>) -> Result<()>;
}
