//! External Integrations
//!
//! Adapters for the external project tracker. Only Jira Software (Agile REST
//! API) is supported; the adapter is read-only.

pub mod jira;

pub use jira::{
    base_url_candidates, build_http_client, provider_message, AgileClient, AgilePage, JiraBoard, JiraIssue,
    JiraIssueFields, JiraPriority, JiraSprint, JiraStatus, JiraStatusCategory, JiraUser,
    SprintState,
};
