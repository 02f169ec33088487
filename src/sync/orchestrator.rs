//! Sync orchestration
//!
//! Each operation resolves credentials, fetches sprints and their issues, and
//! upserts them into the store. Credential problems abort before any network
//! call. Service failures are recorded as the user's connection status and
//! returned; `sync_all` reports each branch separately instead.

use crate::board::board_override;
use crate::config::AppConfig;
use crate::credentials::{self, Credentials, ResolveContext};
use crate::integrations::{AgileClient, SprintState};
use crate::model::{ConnectionStatus, NewIssue, SprintRecord, SprintStatus};
use crate::store::SprintStore;
use crate::sync::normalize::{normalize_issue, normalize_sprint};
use crate::{Result, SprintSyncError};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which sync a trigger asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Active,
    /// Recently closed sprints only
    Closed,
    ClosedAll,
    All,
}

/// Sync trigger as received from a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "type")]
    pub kind: SyncKind,

    #[serde(default)]
    pub force: bool,

    /// Comma-separated board ids for this call only
    #[serde(default, alias = "boardIds", skip_serializing_if = "Option::is_none")]
    pub board_ids: Option<String>,

    /// Board URL for this call only; wins over `board_ids` when it yields an id
    #[serde(default, alias = "boardUrl", skip_serializing_if = "Option::is_none")]
    pub board_url: Option<String>,
}

impl SyncRequest {
    pub fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            force: false,
            board_ids: None,
            board_url: None,
        }
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            force: self.force,
            board_ids: board_override(self.board_url.as_deref(), self.board_ids.as_deref()),
        }
    }
}

/// Per-call options shared by every sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Bypass the freshness skip
    pub force: bool,
    /// Board selection replacing the stored one for this call
    pub board_ids: Option<Vec<u64>>,
}

impl SyncOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            board_ids: None,
        }
    }
}

/// Independent unit of sync work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Active,
    RecentClosed,
    AllClosed,
}

impl Branch {
    /// Key used for freshness markers
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Active => "active",
            Branch::RecentClosed => "closed",
            Branch::AllClosed => "closed_all",
        }
    }

    fn state(&self) -> SprintState {
        match self {
            Branch::Active => SprintState::Active,
            Branch::RecentClosed | Branch::AllClosed => SprintState::Closed,
        }
    }
}

/// Outcome of one branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchResult {
    pub success: bool,
    /// Sprints synced
    pub count: usize,
    /// Issues synced across those sprints
    #[serde(default)]
    pub issues: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BranchResult {
    pub fn synced(count: usize, issues: usize) -> Self {
        Self {
            success: true,
            count,
            issues,
            ..Default::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            success: true,
            skipped: true,
            ..Default::default()
        }
    }

    pub fn failed(error: &SprintSyncError) -> Self {
        Self {
            success: false,
            error: Some(error.user_message()),
            ..Default::default()
        }
    }
}

/// Outcome of `sync_all`: both branches, reported independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub active: BranchResult,
    pub closed: BranchResult,
}

impl CombinedResult {
    pub fn success(&self) -> bool {
        self.active.success && self.closed.success
    }
}

/// Outcome of a dispatched [`SyncRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncOutcome {
    All(CombinedResult),
    Branch(BranchResult),
}

impl SyncOutcome {
    pub fn success(&self) -> bool {
        match self {
            SyncOutcome::All(result) => result.success(),
            SyncOutcome::Branch(result) => result.success,
        }
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs sync operations against a store
pub struct SyncOrchestrator<S: SprintStore> {
    store: Arc<S>,
    http: Client,
    config: AppConfig,
    clock: Clock,
}

impl<S: SprintStore> SyncOrchestrator<S> {
    pub fn new(store: Arc<S>, http: Client, config: AppConfig) -> Self {
        Self {
            store,
            http,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock (used for gross time, freshness and recency)
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Dispatch a sync trigger
    pub async fn run(&self, user_id: &str, request: &SyncRequest) -> Result<SyncOutcome> {
        let options = request.options();
        info!(user = %user_id, kind = ?request.kind, force = request.force, "Sync requested");

        Ok(match request.kind {
            SyncKind::Active => SyncOutcome::Branch(self.sync_active(user_id, &options).await?),
            SyncKind::Closed => {
                SyncOutcome::Branch(self.sync_recent_closed(user_id, &options).await?)
            }
            SyncKind::ClosedAll => {
                SyncOutcome::Branch(self.sync_all_closed(user_id, &options).await?)
            }
            SyncKind::All => SyncOutcome::All(self.sync_all(user_id, &options).await?),
        })
    }

    /// Sync currently active sprints
    pub async fn sync_active(&self, user_id: &str, options: &SyncOptions) -> Result<BranchResult> {
        self.sync_branch(user_id, Branch::Active, options).await
    }

    /// Sync sprints closed within the configured recency window
    pub async fn sync_recent_closed(
        &self,
        user_id: &str,
        options: &SyncOptions,
    ) -> Result<BranchResult> {
        self.sync_branch(user_id, Branch::RecentClosed, options).await
    }

    /// Sync every closed sprint
    pub async fn sync_all_closed(
        &self,
        user_id: &str,
        options: &SyncOptions,
    ) -> Result<BranchResult> {
        self.sync_branch(user_id, Branch::AllClosed, options).await
    }

    /// Sync active and recently closed sprints concurrently
    ///
    /// Unresolvable credentials fail the whole call. Any other failure is
    /// confined to its branch and reported in the result.
    pub async fn sync_all(&self, user_id: &str, options: &SyncOptions) -> Result<CombinedResult> {
        self.credentials(user_id, options).await?;

        let (active, closed) = tokio::join!(
            self.sync_branch(user_id, Branch::Active, options),
            self.sync_branch(user_id, Branch::RecentClosed, options),
        );

        let result = CombinedResult {
            active: active.unwrap_or_else(|e| BranchResult::failed(&e)),
            closed: closed.unwrap_or_else(|e| BranchResult::failed(&e)),
        };

        if !result.success() {
            warn!(
                user = %user_id,
                active_ok = result.active.success,
                closed_ok = result.closed.success,
                "Sync completed with failures"
            );
        }
        Ok(result)
    }

    /// Resolve the credentials a sync for this user would use
    pub async fn credentials(&self, user_id: &str, options: &SyncOptions) -> Result<Credentials> {
        let settings = self.store.integration_settings(user_id).await?;
        let admin_base_url = self.store.admin_base_url().await?;

        let ctx = ResolveContext {
            admin_base_url: admin_base_url.as_deref(),
            default_base_url: self.config.default_base_url.as_deref(),
            default_timeout: Some(self.config.default_request_timeout()),
        };

        Ok(credentials::resolve(&settings, &ctx)?.with_board_override(options.board_ids.clone()))
    }

    async fn sync_branch(
        &self,
        user_id: &str,
        branch: Branch,
        options: &SyncOptions,
    ) -> Result<BranchResult> {
        let credentials = self.credentials(user_id, options).await?;
        let now = self.now();

        if self.is_fresh(user_id, branch, options, now).await? {
            info!(user = %user_id, branch = branch.as_str(), "Recently synced, skipping");
            return Ok(BranchResult::skipped());
        }

        let client = AgileClient::new(self.http.clone(), credentials, &self.config.sync);
        match self.pull(user_id, &client, branch, now).await {
            Ok(result) => {
                self.store.mark_synced(user_id, branch.as_str(), now).await?;
                info!(
                    user = %user_id,
                    branch = branch.as_str(),
                    sprints = result.count,
                    issues = result.issues,
                    "Sync branch complete"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(user = %user_id, branch = branch.as_str(), error = %e, "Sync branch failed");
                if let SprintSyncError::ExternalService(service_error) = &e {
                    self.record_status(user_id, ConnectionStatus::failed(service_error, now))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// True when a non-forced call should be skipped
    ///
    /// An explicit board override is treated like `force`: it asks for boards
    /// the last sync may not have covered.
    async fn is_fresh(
        &self,
        user_id: &str,
        branch: Branch,
        options: &SyncOptions,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if options.force || options.board_ids.is_some() {
            return Ok(false);
        }
        let Some(window) = self.config.sync.min_interval() else {
            return Ok(false);
        };
        let Some(last) = self.store.last_sync(user_id, branch.as_str()).await? else {
            return Ok(false);
        };

        let elapsed = now.signed_duration_since(last);
        Ok(elapsed >= Duration::zero() && elapsed.num_milliseconds() < window.as_millis() as i64)
    }

    async fn pull(
        &self,
        user_id: &str,
        client: &AgileClient,
        branch: Branch,
        now: DateTime<Utc>,
    ) -> Result<BranchResult> {
        let raw_sprints = client.fetch_sprints(branch.state()).await?;
        self.record_status(user_id, ConnectionStatus::connected(now)).await;

        // A window too wide to subtract from `now` keeps every dated sprint
        let cutoff = Duration::try_days(self.config.sync.recent_closed_days.max(0))
            .and_then(|window| now.checked_sub_signed(window));
        let sprints: Vec<(u64, SprintRecord)> = raw_sprints
            .iter()
            .map(|raw| (raw.id, normalize_sprint(raw)))
            .filter(|(_, sprint)| match branch {
                Branch::RecentClosed => sprint
                    .effective_end()
                    .is_some_and(|end| match cutoff {
                        Some(cutoff) => end >= cutoff,
                        None => true,
                    }),
                Branch::Active | Branch::AllClosed => true,
            })
            .collect();

        debug!(
            branch = branch.as_str(),
            fetched = raw_sprints.len(),
            selected = sprints.len(),
            "Sprints selected for sync"
        );

        let outcomes: Vec<Result<usize>> = stream::iter(sprints)
            .map(|(sprint_id, record)| self.sync_sprint(client, sprint_id, record, now))
            .buffer_unordered(self.config.sync.workers.max(1))
            .collect()
            .await;

        let mut count = 0;
        let mut issues = 0;
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(n) => {
                    count += 1;
                    issues += n;
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(BranchResult::synced(count, issues)),
        }
    }

    /// Upsert one sprint and every issue it currently holds
    async fn sync_sprint(
        &self,
        client: &AgileClient,
        sprint_id: u64,
        record: SprintRecord,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let sprint = self.store.upsert_sprint(&record).await?.record;
        if sprint.status == SprintStatus::Unknown {
            debug!(sprint = %sprint.external_id, "Sprint has no recognised state");
        }

        let raw_issues = client.list_sprint_issues(sprint_id).await?;
        let sprint_field_id = client.credentials().sprint_field_id.as_deref();

        for raw in &raw_issues {
            let issue = normalize_issue(raw, sprint_field_id);
            if !issue.reported_sprint_ids.is_empty()
                && !issue.reported_sprint_ids.contains(&sprint.external_id)
            {
                debug!(
                    issue = %issue.key,
                    sprint = %sprint.external_id,
                    reported = ?issue.reported_sprint_ids,
                    "Sprint field disagrees with sprint listing"
                );
            }

            let upserted = self
                .store
                .upsert_issue(&NewIssue {
                    sprint_id: sprint.id,
                    observed_at: now,
                    record: issue,
                })
                .await?;

            if upserted.record.sprint_id != sprint.id {
                debug!(
                    issue = %upserted.record.key,
                    owner = upserted.record.sprint_id,
                    observed_in = sprint.id,
                    "Issue now listed under another sprint; keeping original owner"
                );
            }
        }

        Ok(raw_issues.len())
    }

    async fn record_status(&self, user_id: &str, status: ConnectionStatus) {
        if let Err(e) = self.store.record_connection_status(user_id, &status).await {
            warn!(user = %user_id, error = %e, "Failed to record connection status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrationSettings;
    use crate::store::SqliteStore;

    fn orchestrator(store: SqliteStore) -> SyncOrchestrator<SqliteStore> {
        SyncOrchestrator::new(Arc::new(store), Client::new(), AppConfig::new())
    }

    #[test]
    fn test_request_deserialization() {
        let request: SyncRequest = serde_json::from_str(
            r#"{"type":"closed_all","force":true,"boardIds":"1, 2","boardUrl":"https://acme.atlassian.net/boards/42"}"#,
        )
        .unwrap();
        assert_eq!(request.kind, SyncKind::ClosedAll);
        assert!(request.force);
        assert_eq!(request.options().board_ids, Some(vec![42]));

        let minimal: SyncRequest = serde_json::from_str(r#"{"type":"all"}"#).unwrap();
        assert_eq!(minimal, SyncRequest::new(SyncKind::All));
        assert_eq!(minimal.options(), SyncOptions::default());
    }

    #[test]
    fn test_result_serialization() {
        let outcome = SyncOutcome::All(CombinedResult {
            active: BranchResult::synced(2, 9),
            closed: BranchResult::skipped(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["active"]["count"], 2);
        assert_eq!(json["closed"]["skipped"], true);
        assert!(json["active"].get("skipped").is_none());
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_unconfigured_user_fails_every_operation() {
        let sync = orchestrator(SqliteStore::open_in_memory().unwrap());
        let options = SyncOptions::default();

        let err = sync.sync_active("nobody", &options).await.unwrap_err();
        assert!(matches!(err, SprintSyncError::Configuration(_)));

        let err = sync.sync_all("nobody", &options).await.unwrap_err();
        assert!(matches!(err, SprintSyncError::Configuration(_)));

        assert!(sync.store().connection_status("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credentials_apply_board_override() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_integration_settings(
                "alice",
                &IntegrationSettings::bearer("https://jira.example.com", "pat").with_board_ids("1"),
            )
            .await
            .unwrap();
        store
            .set_admin_base_url(Some("https://admin.example.com/"))
            .await
            .unwrap();
        let sync = orchestrator(store);

        let options = SyncOptions {
            force: false,
            board_ids: Some(vec![5, 6]),
        };
        let creds = sync.credentials("alice", &options).await.unwrap();
        assert_eq!(creds.base_url, "https://admin.example.com");
        assert_eq!(creds.board_ids, Some([5u64, 6].into_iter().collect()));
    }

    #[tokio::test]
    async fn test_fresh_branch_is_skipped_unless_forced() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_integration_settings(
                "alice",
                &IntegrationSettings::bearer("http://127.0.0.1:9", "pat"),
            )
            .await
            .unwrap();
        let now = Utc::now();
        store.mark_synced("alice", "active", now).await.unwrap();

        let sync = orchestrator(store).with_clock(move || now + Duration::seconds(5));
        let result = sync
            .sync_active("alice", &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(result, BranchResult::skipped());

        // A different branch has no marker yet, so it goes to the network and fails
        let closed = sync
            .sync_recent_closed("alice", &SyncOptions::default())
            .await;
        assert!(closed.is_err());
    }
}
