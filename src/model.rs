//! Core data structures
//!
//! Canonical sprint and issue shapes shared by the normalizer, the store and
//! the report selector. `*Record` types are what a sync observed upstream;
//! `Stored*` types are rows as they exist locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sprint lifecycle state as mirrored locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SprintStatus {
    Active,
    Closed,
    /// Missing or unrecognized upstream state
    Unknown,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Active => "ACTIVE",
            SprintStatus::Closed => "CLOSED",
            SprintStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parse a stored or upstream state, case-insensitively
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => SprintStatus::Active,
            "closed" => SprintStatus::Closed,
            _ => SprintStatus::Unknown,
        }
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A sprint as observed upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub external_id: String,
    pub name: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// When the sprint was actually completed (closed sprints only)
    pub complete_date: Option<DateTime<Utc>>,
    pub status: SprintStatus,
}

impl SprintRecord {
    /// End of the sprint for recency purposes: completion if known, else planned end
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        self.complete_date.or(self.end_date)
    }
}

/// An issue as observed upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub external_id: String,
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: String,
    pub assignee: Option<String>,
    pub priority: String,
    /// Sprint ids the issue's sprint field reports, when that field is configured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reported_sprint_ids: Vec<String>,
}

/// Sprint row in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSprint {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SprintStatus,
}

/// Issue row in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIssue {
    pub id: i64,
    pub external_id: String,
    /// Owning sprint row; fixed when the issue is first stored
    pub sprint_id: i64,
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: String,
    pub assignee: Option<String>,
    pub priority: String,
    /// Whole days elapsed since the owning sprint started, never negative
    pub gross_time: i64,
}

/// Issue upsert input: the observed record, the sprint it was listed under,
/// and the sync time `gross_time` is measured against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub sprint_id: i64,
    pub observed_at: DateTime<Utc>,
    pub record: IssueRecord,
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted<T> {
    pub record: T,
    pub created: bool,
}

/// Minimal sprint view used for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintSnapshot {
    pub external_id: String,
    pub name: String,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SprintStatus,
}

impl From<&StoredSprint> for SprintSnapshot {
    fn from(sprint: &StoredSprint) -> Self {
        Self {
            external_id: sprint.external_id.clone(),
            name: sprint.name.clone(),
            end_date: sprint.end_date,
            status: sprint.status,
        }
    }
}

/// Last observed state of the Jira connection for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// connected, unauthorized, forbidden, not_found or error
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ConnectionStatus {
    pub fn connected(at: DateTime<Utc>) -> Self {
        Self {
            status: "connected".to_string(),
            message: None,
            checked_at: at,
        }
    }

    pub fn failed(error: &crate::ExternalServiceError, at: DateTime<Utc>) -> Self {
        Self {
            status: error.kind.as_status().to_string(),
            message: Some(error.user_message()),
            checked_at: at,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == "connected"
    }
}
