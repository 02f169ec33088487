//! Jira Agile REST client
//!
//! Read-only, paginated access to boards, sprints and sprint issues. Every
//! listing is capped at `max_pages` pages per base URL. When the configured
//! URL is a bare site root, the client also probes the common context paths
//! (`/jira`, `/confluence`, `/wiki`) and sticks with the first one that answers.

use crate::config::{SyncConfig, MAX_PAGE_SIZE};
use crate::credentials::{AuthScheme, Credentials};
use crate::{ExternalServiceError, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

const AGILE_API: &str = "rest/agile/1.0";

/// Context paths a self-hosted Atlassian site is commonly mounted under
const CONTEXT_PATHS: [&str; 3] = ["jira", "confluence", "wiki"];

/// Fields requested for sprint issues
const ISSUE_FIELDS: &str = "summary,description,status,assignee,priority";

/// One page of an Agile listing
///
/// Board and sprint listings use `values`; sprint issue listings use `issues`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgilePage<T> {
    #[serde(default = "Vec::new", alias = "issues")]
    pub values: Vec<T>,
    #[serde(rename = "startAt", default)]
    pub start_at: u64,
    #[serde(rename = "maxResults", default)]
    pub max_results: Option<u64>,
    #[serde(rename = "isLast", default)]
    pub is_last: Option<bool>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraBoard {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub board_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSprint {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// "future", "active" or "closed"
    #[serde(default)]
    pub state: Option<String>,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(rename = "completeDate", default)]
    pub complete_date: Option<String>,
    #[serde(rename = "originBoardId", default)]
    pub origin_board_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    /// Numeric id; Cloud sends it as a string, some Data Center builds as a number
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: JiraIssueFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraIssueFields {
    #[serde(default)]
    pub summary: Option<String>,
    /// Plain text (Data Center) or an Atlassian Document Format tree (Cloud)
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub status: Option<JiraStatus>,
    #[serde(default)]
    pub assignee: Option<JiraUser>,
    #[serde(default)]
    pub priority: Option<JiraPriority>,
    /// Everything else, including custom fields
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "statusCategory", default)]
    pub status_category: Option<JiraStatusCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatusCategory {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraUser {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraPriority {
    #[serde(default)]
    pub name: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Build the shared HTTP client handed to the sync engine
///
/// Timeouts are applied per request from the resolved credentials.
pub fn build_http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("sprintsync/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Sprint state filter for sprint listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprintState {
    Active,
    Closed,
}

impl SprintState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintState::Active => "active",
            SprintState::Closed => "closed",
        }
    }
}

/// Jira Agile API client bound to one set of resolved credentials
pub struct AgileClient {
    client: Client,
    credentials: Credentials,
    page_size: u32,
    max_pages: u32,
    /// Base URL that answered first; reused by later calls
    resolved_base: Mutex<Option<String>>,
}

impl AgileClient {
    /// Create a client that shares the given HTTP connection pool
    pub fn new(client: Client, credentials: Credentials, sync: &SyncConfig) -> Self {
        Self {
            client,
            credentials,
            page_size: sync.page_size.clamp(1, MAX_PAGE_SIZE),
            max_pages: sync.max_pages.max(1),
            resolved_base: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Base URL that answered, once any call has succeeded
    pub fn resolved_base_url(&self) -> Option<String> {
        self.resolved_base.lock().ok().and_then(|guard| guard.clone())
    }

    /// List scrum boards visible to the credentials
    pub async fn list_boards(&self) -> Result<Vec<JiraBoard>> {
        let query = vec![("type".to_string(), "scrum".to_string())];
        let boards: Vec<JiraBoard> = self.paginate_with_fallback("board", &query).await?;
        info!(count = boards.len(), "Listed Jira boards");
        Ok(boards)
    }

    /// List a board's sprints in the given state
    pub async fn list_sprints(&self, board_id: u64, state: SprintState) -> Result<Vec<JiraSprint>> {
        let path = format!("board/{}/sprint", board_id);
        let query = vec![("state".to_string(), state.as_str().to_string())];
        let sprints: Vec<JiraSprint> = self.paginate_with_fallback(&path, &query).await?;

        // Closed sprints come back oldest first, so a capped listing drops the newest
        if state == SprintState::Closed && self.reached_page_cap(sprints.len()) {
            warn!(
                board_id,
                listed = sprints.len(),
                "Closed sprint listing hit the page cap; recent sprints may be missing"
            );
        }
        Ok(sprints)
    }

    /// Whether a listing of `returned` items filled every allowed page
    fn reached_page_cap(&self, returned: usize) -> bool {
        returned >= self.page_size as usize * self.max_pages as usize
    }

    /// List the issues currently in a sprint
    pub async fn list_sprint_issues(&self, sprint_id: u64) -> Result<Vec<JiraIssue>> {
        let path = format!("sprint/{}/issue", sprint_id);
        let fields = match self.credentials.sprint_field_id.as_deref() {
            Some(field) => format!("{},{}", ISSUE_FIELDS, field),
            None => ISSUE_FIELDS.to_string(),
        };
        let query = vec![("fields".to_string(), fields)];
        self.paginate_with_fallback(&path, &query).await
    }

    /// Sprints in `state` across the configured boards, or every scrum board
    /// when none are configured. A sprint shared by several boards appears once.
    pub async fn fetch_sprints(&self, state: SprintState) -> Result<Vec<JiraSprint>> {
        let board_ids: Vec<u64> = match &self.credentials.board_ids {
            Some(ids) => ids.iter().copied().collect(),
            None => self.list_boards().await?.into_iter().map(|b| b.id).collect(),
        };

        let mut seen = BTreeSet::new();
        let mut sprints = Vec::new();
        for board_id in board_ids {
            for sprint in self.list_sprints(board_id, state).await? {
                if seen.insert(sprint.id) {
                    sprints.push(sprint);
                }
            }
        }

        info!(state = state.as_str(), count = sprints.len(), "Fetched Jira sprints");
        Ok(sprints)
    }

    /// Paginate `path` against the resolved base, or probe candidates until one answers
    async fn paginate_with_fallback<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>> {
        if let Some(base) = self.resolved_base_url() {
            return self.paginate(&base, path, query).await;
        }

        let mut first_error = None;
        for base in base_url_candidates(&self.credentials.base_url) {
            match self.paginate(&base, path, query).await {
                Ok(items) => {
                    if base != self.credentials.base_url {
                        info!(base_url = %base, "Using alternate Jira base URL");
                    }
                    if let Ok(mut guard) = self.resolved_base.lock() {
                        *guard = Some(base);
                    }
                    return Ok(items);
                }
                Err(e) => {
                    debug!(base_url = %base, error = %e, "Jira base URL candidate failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        Err(first_error.unwrap_or_else(|| {
            ExternalServiceError::transport("no usable Jira base URL").into()
        }))
    }

    /// Fetch pages from one base URL until the listing ends or the page cap is hit
    async fn paginate<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut start_at: u64 = 0;

        for page_number in 0..self.max_pages {
            let page: AgilePage<T> = self.get_page(base, path, query, start_at).await?;
            let returned = page.values.len();
            let is_last = page.is_last.unwrap_or(false);
            items.extend(page.values);

            if returned == 0 || is_last || returned < self.page_size as usize {
                return Ok(items);
            }
            if page_number + 1 == self.max_pages {
                warn!(
                    path = %path,
                    pages = self.max_pages,
                    "Jira listing truncated at page cap"
                );
            }
            start_at += returned as u64;
        }

        Ok(items)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        query: &[(String, String)],
        start_at: u64,
    ) -> Result<AgilePage<T>> {
        let url = format!("{}/{}/{}", base.trim_end_matches('/'), AGILE_API, path);

        debug!(url = %url, start_at, "Fetching Jira page");

        let request = self
            .client
            .get(&url)
            .query(query)
            .query(&[
                ("startAt", start_at.to_string()),
                ("maxResults", self.page_size.to_string()),
            ])
            .header("Accept", "application/json")
            .timeout(self.credentials.request_timeout);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(ExternalServiceError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalServiceError::from_status(status.as_u16(), provider_message(&body)).into());
        }

        let page = response.json::<AgilePage<T>>().await.map_err(|e| {
            ExternalServiceError::transport(format!("unexpected response from {}: {}", url, e))
        })?;
        Ok(page)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials.auth {
            AuthScheme::Basic { user } => request.basic_auth(user, Some(&self.credentials.token)),
            AuthScheme::Bearer { .. } => request.bearer_auth(&self.credentials.token),
            AuthScheme::OAuth { .. } => request.bearer_auth(&self.credentials.token),
        }
    }
}

/// Base URLs to try, in order
///
/// The configured URL always comes first. A bare site root (no path) also
/// yields its common context-path siblings.
pub fn base_url_candidates(base_url: &str) -> Vec<String> {
    let base = base_url.trim().trim_end_matches('/').to_string();
    let mut candidates = vec![base.clone()];

    let Ok(url) = Url::parse(&base) else {
        return candidates;
    };
    let is_root = url.path().trim_matches('/').is_empty();
    if !is_root || url.cannot_be_a_base() {
        return candidates;
    }

    let origin = url.origin().ascii_serialization();
    for context in CONTEXT_PATHS {
        let candidate = format!("{}/{}", origin, context);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Pull the human-readable message out of a Jira error body
///
/// Jira answers with `{"errorMessages": [...], "errors": {...}}`; gateways and
/// proxies often use `{"message": "..."}`. Non-JSON bodies are used as-is.
pub fn provider_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Some(body.chars().take(500).collect());
    };

    let mut messages: Vec<String> = json
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(errors) = json.get("errors").and_then(Value::as_object) {
        messages.extend(errors.values().filter_map(Value::as_str).map(str::to_string));
    }

    if messages.is_empty() {
        if let Some(msg) = json.get("message").and_then(Value::as_str) {
            messages.push(msg.to_string());
        }
    }

    let joined = messages
        .into_iter()
        .filter(|m| !m.trim().is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}
