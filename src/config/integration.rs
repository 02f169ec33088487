//! Persisted Jira integration settings
//!
//! One record per user, as stored by the settings screen of whatever front end
//! drives the sync. Values are kept exactly as entered; interpretation happens
//! in [`crate::credentials::resolve`].

use serde::{Deserialize, Serialize};

/// Jira integration settings for a single user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    /// Jira site URL (e.g., "https://acme.atlassian.net" or "https://jira.corp.example")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Account email (Cloud) or username (Data Center) for basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// API token or personal access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// "basic" or "bearer"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    /// "cloud" or "datacenter"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    /// Comma-separated board ids, as typed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_ids: Option<String>,

    /// Custom field holding sprint membership (e.g., "customfield_10020")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_field_id: Option<String>,

    /// OAuth 2.0 (3LO) access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_access_token: Option<String>,

    /// Atlassian cloud resource id paired with the OAuth token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_cloud_id: Option<String>,

    /// Per-request timeout override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl IntegrationSettings {
    /// Settings for basic auth against a site URL
    pub fn basic(
        base_url: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: Some(base_url.into()),
            user: Some(user.into()),
            token: Some(token.into()),
            auth_type: Some("basic".to_string()),
            ..Default::default()
        }
    }

    /// Settings for a bearer personal access token
    pub fn bearer(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            token: Some(token.into()),
            auth_type: Some("bearer".to_string()),
            ..Default::default()
        }
    }

    /// Attach OAuth credentials
    pub fn with_oauth(mut self, access_token: impl Into<String>, cloud_id: impl Into<String>) -> Self {
        self.oauth_access_token = Some(access_token.into());
        self.oauth_cloud_id = Some(cloud_id.into());
        self
    }

    /// Set the stored board id list
    pub fn with_board_ids(mut self, board_ids: impl Into<String>) -> Self {
        self.board_ids = Some(board_ids.into());
        self
    }

    /// Set the deployment type
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    /// Set the sprint custom field id
    pub fn with_sprint_field(mut self, field_id: impl Into<String>) -> Self {
        self.sprint_field_id = Some(field_id.into());
        self
    }

    /// Merge non-empty values from `update` over this record
    pub fn merge(&mut self, update: IntegrationSettings) {
        fn take(dst: &mut Option<String>, src: Option<String>) {
            if let Some(value) = src {
                *dst = Some(value);
            }
        }

        take(&mut self.base_url, update.base_url);
        take(&mut self.user, update.user);
        take(&mut self.token, update.token);
        take(&mut self.auth_type, update.auth_type);
        take(&mut self.deployment, update.deployment);
        take(&mut self.board_ids, update.board_ids);
        take(&mut self.sprint_field_id, update.sprint_field_id);
        take(&mut self.oauth_access_token, update.oauth_access_token);
        take(&mut self.oauth_cloud_id, update.oauth_cloud_id);
        if update.request_timeout_ms.is_some() {
            self.request_timeout_ms = update.request_timeout_ms;
        }
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "********".to_string());
        Self {
            token: mask(&self.token),
            oauth_access_token: mask(&self.oauth_access_token),
            ..self.clone()
        }
    }
}
