//! Sprint and issue synchronization
//!
//! [`normalize`] maps raw Jira payloads to canonical records;
//! [`orchestrator`] drives the sync operations against a [`crate::store::SprintStore`].

pub mod normalize;
pub mod orchestrator;

pub use normalize::{gross_time, normalize_issue, normalize_sprint, parse_jira_datetime};
pub use orchestrator::{
    Branch, BranchResult, CombinedResult, SyncKind, SyncOptions, SyncOrchestrator, SyncOutcome,
    SyncRequest,
};
