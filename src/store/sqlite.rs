//! SQLite store implementation

use super::SprintStore;
use crate::config::IntegrationSettings;
use crate::model::{
    ConnectionStatus, NewIssue, SprintRecord, SprintSnapshot, SprintStatus, StoredIssue,
    StoredSprint, Upserted,
};
use crate::sync::normalize::gross_time;
use crate::{Result, SprintSyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const ADMIN_BASE_URL_KEY: &str = "jira_admin_base_url";

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    pub wal_mode: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
        }
    }
}

/// SQLite-backed [`SprintStore`]
///
/// One connection behind a mutex; blocking work runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a store database
    pub fn open(config: StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %config.path.display(), "Opening sprint database");

        let conn = Connection::open(&config.path)?;

        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(config.path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Database path, or `None` for an in-memory store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sprints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                sprint_id INTEGER NOT NULL REFERENCES sprints(id),
                issue_key TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                assignee TEXT,
                priority TEXT NOT NULL,
                gross_time INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS integration_settings (
                user_id TEXT PRIMARY KEY,
                settings TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS app_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS connection_status (
                user_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                message TEXT,
                checked_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                user_id TEXT NOT NULL,
                branch TEXT NOT NULL,
                last_success_at TEXT NOT NULL,
                PRIMARY KEY (user_id, branch)
            );

            CREATE INDEX IF NOT EXISTS idx_sprints_end_date ON sprints(end_date);
            CREATE INDEX IF NOT EXISTS idx_issues_sprint ON issues(sprint_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SprintSyncError::Storage("database connection mutex poisoned".to_string()))
    }

    /// Run blocking database work off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                SprintSyncError::Storage("database connection mutex poisoned".to_string())
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| SprintSyncError::Storage(format!("database task failed: {}", e)))?
    }

    /// Row counts for status output
    pub async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let sprint_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sprints", [], |row| row.get(0))?;
            let issue_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
            Ok(StoreStats {
                sprint_count: sprint_count as usize,
                issue_count: issue_count as usize,
            })
        })
        .await
    }
}

/// Store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub sprint_count: usize,
    pub issue_count: usize,
}

#[async_trait]
impl SprintStore for SqliteStore {
    async fn integration_settings(&self, user_id: &str) -> Result<IntegrationSettings> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT settings FROM integration_settings WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            match raw {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(IntegrationSettings::default()),
            }
        })
        .await
    }

    async fn save_integration_settings(
        &self,
        user_id: &str,
        settings: &IntegrationSettings,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        let json = serde_json::to_string(settings)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO integration_settings (user_id, settings, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     settings = excluded.settings,
                     updated_at = excluded.updated_at",
                params![user_id, json, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn admin_base_url(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM app_settings WHERE key = ?1",
                    params![ADMIN_BASE_URL_KEY],
                    |row| row.get::<_, String>(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set_admin_base_url(&self, url: Option<&str>) -> Result<()> {
        let url = url.map(str::to_string);
        self.with_conn(move |conn| {
            match url {
                Some(value) => conn.execute(
                    "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![ADMIN_BASE_URL_KEY, value],
                )?,
                None => conn.execute(
                    "DELETE FROM app_settings WHERE key = ?1",
                    params![ADMIN_BASE_URL_KEY],
                )?,
            };
            Ok(())
        })
        .await
    }

    async fn upsert_sprint(&self, sprint: &SprintRecord) -> Result<Upserted<StoredSprint>> {
        let sprint = sprint.clone();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existed = tx
                .query_row(
                    "SELECT id FROM sprints WHERE external_id = ?1",
                    params![sprint.external_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();

            // external_id is only ever written by the INSERT branch
            tx.execute(
                "INSERT INTO sprints (external_id, name, start_date, end_date, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(external_id) DO UPDATE SET
                     name = excluded.name,
                     start_date = excluded.start_date,
                     end_date = excluded.end_date,
                     status = excluded.status,
                     updated_at = excluded.updated_at",
                params![
                    sprint.external_id,
                    sprint.name,
                    sprint.start_date.map(|d| d.to_rfc3339()),
                    sprint.end_date.map(|d| d.to_rfc3339()),
                    sprint.status.as_str(),
                    now,
                ],
            )?;

            let stored = tx.query_row(
                "SELECT id, external_id, name, start_date, end_date, status
                 FROM sprints WHERE external_id = ?1",
                params![sprint.external_id],
                row_to_sprint,
            )?;
            tx.commit()?;

            Ok(Upserted {
                record: stored,
                created: !existed,
            })
        })
        .await
    }

    async fn upsert_issue(&self, issue: &NewIssue) -> Result<Upserted<StoredIssue>> {
        let issue = issue.clone();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let record = &issue.record;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let owner = tx
                .query_row(
                    "SELECT sprint_id FROM issues WHERE external_id = ?1",
                    params![record.external_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            let existed = owner.is_some();

            // Elapsed days are measured from the owning sprint, which stays
            // the first sprint the issue was seen in
            let owner_start = tx
                .query_row(
                    "SELECT start_date FROM sprints WHERE id = ?1",
                    params![owner.unwrap_or(issue.sprint_id)],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten();
            let elapsed_days = gross_time(parse_timestamp(owner_start), issue.observed_at);

            // sprint_id is deliberately absent from the update list
            tx.execute(
                "INSERT INTO issues (
                     external_id, sprint_id, issue_key, summary, description,
                     status, assignee, priority, gross_time, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(external_id) DO UPDATE SET
                     issue_key = excluded.issue_key,
                     summary = excluded.summary,
                     description = excluded.description,
                     status = excluded.status,
                     assignee = excluded.assignee,
                     priority = excluded.priority,
                     gross_time = excluded.gross_time,
                     updated_at = excluded.updated_at",
                params![
                    record.external_id,
                    issue.sprint_id,
                    record.key,
                    record.summary,
                    record.description,
                    record.status,
                    record.assignee,
                    record.priority,
                    elapsed_days,
                    now,
                ],
            )?;

            let stored = tx.query_row(
                &format!("{} WHERE external_id = ?1", ISSUE_SELECT),
                params![record.external_id],
                row_to_issue,
            )?;
            tx.commit()?;

            Ok(Upserted {
                record: stored,
                created: !existed,
            })
        })
        .await
    }

    async fn sprint_by_external_id(&self, external_id: &str) -> Result<Option<StoredSprint>> {
        let external_id = external_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, external_id, name, start_date, end_date, status
                     FROM sprints WHERE external_id = ?1",
                    params![external_id],
                    row_to_sprint,
                )
                .optional()?)
        })
        .await
    }

    async fn issue_by_external_id(&self, external_id: &str) -> Result<Option<StoredIssue>> {
        let external_id = external_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("{} WHERE external_id = ?1", ISSUE_SELECT),
                    params![external_id],
                    row_to_issue,
                )
                .optional()?)
        })
        .await
    }

    async fn issues_for_sprint(&self, sprint_id: i64) -> Result<Vec<StoredIssue>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE sprint_id = ?1 ORDER BY issue_key ASC",
                ISSUE_SELECT
            ))?;
            let rows = stmt.query_map(params![sprint_id], row_to_issue)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn sprint_snapshots(&self) -> Result<Vec<SprintSnapshot>> {
        self.with_conn(|conn| {
            // NULL end dates sort last
            let mut stmt = conn.prepare(
                "SELECT id, external_id, name, start_date, end_date, status
                 FROM sprints
                 ORDER BY end_date IS NULL, end_date DESC, id ASC",
            )?;
            let rows = stmt.query_map([], row_to_sprint)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(SprintSnapshot::from(&row?));
            }
            Ok(out)
        })
        .await
    }

    async fn record_connection_status(
        &self,
        user_id: &str,
        status: &ConnectionStatus,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        let status = status.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO connection_status (user_id, status, message, checked_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                     status = excluded.status,
                     message = excluded.message,
                     checked_at = excluded.checked_at",
                params![
                    user_id,
                    status.status,
                    status.message,
                    status.checked_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn connection_status(&self, user_id: &str) -> Result<Option<ConnectionStatus>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT status, message, checked_at FROM connection_status WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            Ok(row.and_then(|(status, message, checked_at)| {
                parse_timestamp(Some(checked_at)).map(|checked_at| ConnectionStatus {
                    status,
                    message,
                    checked_at,
                })
            }))
        })
        .await
    }

    async fn last_sync(&self, user_id: &str, branch: &str) -> Result<Option<DateTime<Utc>>> {
        let user_id = user_id.to_string();
        let branch = branch.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT last_success_at FROM sync_state WHERE user_id = ?1 AND branch = ?2",
                    params![user_id, branch],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(parse_timestamp(raw))
        })
        .await
    }

    async fn mark_synced(&self, user_id: &str, branch: &str, at: DateTime<Utc>) -> Result<()> {
        let user_id = user_id.to_string();
        let branch = branch.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_state (user_id, branch, last_success_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, branch) DO UPDATE SET
                     last_success_at = excluded.last_success_at",
                params![user_id, branch, at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }
}

const ISSUE_SELECT: &str = "SELECT id, external_id, sprint_id, issue_key, summary, description,
            status, assignee, priority, gross_time
     FROM issues";

fn row_to_sprint(row: &Row<'_>) -> rusqlite::Result<StoredSprint> {
    Ok(StoredSprint {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        start_date: parse_timestamp(row.get(3)?),
        end_date: parse_timestamp(row.get(4)?),
        status: SprintStatus::parse(&row.get::<_, String>(5)?),
    })
}

fn row_to_issue(row: &Row<'_>) -> rusqlite::Result<StoredIssue> {
    Ok(StoredIssue {
        id: row.get(0)?,
        external_id: row.get(1)?,
        sprint_id: row.get(2)?,
        key: row.get(3)?,
        summary: row.get(4)?,
        description: row.get(5)?,
        status: row.get(6)?,
        assignee: row.get(7)?,
        priority: row.get(8)?,
        gross_time: row.get(9)?,
    })
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}
