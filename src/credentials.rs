//! Credential resolution
//!
//! Turns a user's persisted [`IntegrationSettings`] (plus an admin-level base
//! URL override and the configured default) into one normalized
//! [`Credentials`] value. Resolution is a pure function: identical inputs
//! always give identical output and nothing touches the network.
//!
//! Precedence:
//! 1. An OAuth access token paired with a cloud id always wins. The base URL is
//!    synthesized from the cloud id and stored URL/auth fields are ignored.
//! 2. Otherwise the stored auth type (`bearer` if set, else `basic`) and
//!    deployment (`cloud` unless `datacenter`), with the base URL taken from the
//!    admin override, the user's URL, or the configured default, in that order.

use crate::board::parse_board_list;
use crate::config::IntegrationSettings;
use crate::{Result, SprintSyncError};
use std::collections::BTreeSet;
use std::time::Duration;

/// Gateway for OAuth (3LO) calls to Jira Cloud
pub const ATLASSIAN_API_GATEWAY: &str = "https://api.atlassian.com/ex/jira";

/// Where the Jira instance runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Cloud,
    DataCenter,
}

impl Deployment {
    fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("datacenter") | Some("data_center") | Some("server") => Deployment::DataCenter,
            _ => Deployment::Cloud,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Deployment::Cloud => "cloud",
            Deployment::DataCenter => "datacenter",
        }
    }
}

/// How outgoing requests authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// HTTP Basic with account email/username and API token
    Basic { user: String },
    /// Bearer personal access token; the user is informational only
    Bearer { user: Option<String> },
    /// OAuth 2.0 access token scoped to one cloud site
    OAuth { cloud_id: String },
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Basic { .. } => "basic",
            AuthScheme::Bearer { .. } => "bearer",
            AuthScheme::OAuth { .. } => "oauth",
        }
    }
}

/// Resolved connection parameters for one sync call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub auth: AuthScheme,
    pub token: String,
    pub deployment: Deployment,
    pub board_ids: Option<BTreeSet<u64>>,
    pub sprint_field_id: Option<String>,
    pub request_timeout: Duration,
}

impl Credentials {
    /// Identity sent with the request, if the scheme has one
    pub fn user(&self) -> Option<&str> {
        match &self.auth {
            AuthScheme::Basic { user } => Some(user),
            AuthScheme::Bearer { user } => user.as_deref(),
            AuthScheme::OAuth { .. } => None,
        }
    }

    /// Replace the board selection for this call only
    pub fn with_board_override(mut self, board_ids: Option<Vec<u64>>) -> Self {
        if let Some(ids) = board_ids {
            self.board_ids = Some(ids.into_iter().collect());
        }
        self
    }
}

/// Inputs to credential resolution beyond the user's own settings
#[derive(Debug, Clone, Default)]
pub struct ResolveContext<'a> {
    /// Admin-level base URL that overrides any per-user URL
    pub admin_base_url: Option<&'a str>,
    /// Base URL from the application config
    pub default_base_url: Option<&'a str>,
    /// Timeout used when the settings carry none
    pub default_timeout: Option<Duration>,
}

/// Resolve a user's settings into credentials
pub fn resolve(settings: &IntegrationSettings, ctx: &ResolveContext<'_>) -> Result<Credentials> {
    let board_ids = settings
        .board_ids
        .as_deref()
        .and_then(parse_board_list)
        .map(|ids| ids.into_iter().collect::<BTreeSet<_>>());
    let sprint_field_id = non_blank(settings.sprint_field_id.as_deref()).map(str::to_string);
    let request_timeout = settings
        .request_timeout_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .or(ctx.default_timeout)
        .unwrap_or(Duration::from_millis(crate::config::DEFAULT_REQUEST_TIMEOUT_MS));

    let oauth_token = non_blank(settings.oauth_access_token.as_deref());
    let cloud_id = non_blank(settings.oauth_cloud_id.as_deref());
    if let (Some(token), Some(cloud_id)) = (oauth_token, cloud_id) {
        return Ok(Credentials {
            base_url: format!("{}/{}", ATLASSIAN_API_GATEWAY, cloud_id),
            auth: AuthScheme::OAuth {
                cloud_id: cloud_id.to_string(),
            },
            token: token.to_string(),
            deployment: Deployment::Cloud,
            board_ids,
            sprint_field_id,
            request_timeout,
        });
    }

    let base_url = non_blank(ctx.admin_base_url)
        .or_else(|| non_blank(settings.base_url.as_deref()))
        .or_else(|| non_blank(ctx.default_base_url))
        .map(normalize_base_url)
        .ok_or_else(|| SprintSyncError::Configuration("no Jira base URL configured".to_string()))?;

    let token = non_blank(settings.token.as_deref())
        .ok_or_else(|| SprintSyncError::Configuration("no Jira API token configured".to_string()))?
        .to_string();

    let user = non_blank(settings.user.as_deref()).map(str::to_string);
    let bearer = settings
        .auth_type
        .as_deref()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("bearer"));

    let auth = if bearer {
        AuthScheme::Bearer { user }
    } else {
        let user = user.ok_or_else(|| {
            SprintSyncError::Configuration(
                "basic authentication requires a Jira user or email".to_string(),
            )
        })?;
        AuthScheme::Basic { user }
    };

    Ok(Credentials {
        base_url,
        auth,
        token,
        deployment: Deployment::from_setting(settings.deployment.as_deref()),
        board_ids,
        sprint_field_id,
        request_timeout,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext<'static> {
        ResolveContext::default()
    }

    #[test]
    fn test_oauth_wins_over_stored_token() {
        let settings = IntegrationSettings::basic("https://acme.atlassian.net", "dev@acme.io", "api-token")
            .with_oauth("oauth-token", "c0ffee")
            .with_deployment("datacenter");
        let admin = ResolveContext {
            admin_base_url: Some("https://admin.example.com"),
            ..Default::default()
        };

        let creds = resolve(&settings, &admin).unwrap();
        assert_eq!(creds.base_url, "https://api.atlassian.com/ex/jira/c0ffee");
        assert_eq!(
            creds.auth,
            AuthScheme::OAuth {
                cloud_id: "c0ffee".to_string()
            }
        );
        assert_eq!(creds.token, "oauth-token");
        assert_eq!(creds.deployment, Deployment::Cloud);
        assert_eq!(creds.user(), None);
    }

    #[test]
    fn test_oauth_needs_both_token_and_cloud_id() {
        let mut settings = IntegrationSettings::bearer("https://jira.corp.example", "pat");
        settings.oauth_access_token = Some("oauth-token".to_string());

        let creds = resolve(&settings, &ctx()).unwrap();
        assert_eq!(creds.auth.as_str(), "bearer");
        assert_eq!(creds.token, "pat");
    }

    #[test]
    fn test_base_url_precedence() {
        let settings = IntegrationSettings::bearer("https://user.example.com/", "pat");

        let with_admin = ResolveContext {
            admin_base_url: Some("https://admin.example.com"),
            default_base_url: Some("https://default.example.com"),
            ..Default::default()
        };
        assert_eq!(
            resolve(&settings, &with_admin).unwrap().base_url,
            "https://admin.example.com"
        );

        let without_admin = ResolveContext {
            admin_base_url: Some("  "),
            default_base_url: Some("https://default.example.com"),
            ..Default::default()
        };
        assert_eq!(
            resolve(&settings, &without_admin).unwrap().base_url,
            "https://user.example.com"
        );

        let mut no_user_url = settings.clone();
        no_user_url.base_url = None;
        assert_eq!(
            resolve(&no_user_url, &without_admin).unwrap().base_url,
            "https://default.example.com"
        );
    }

    #[test]
    fn test_missing_base_url_is_configuration_error() {
        let mut settings = IntegrationSettings::bearer("", "pat");
        settings.base_url = None;
        let err = resolve(&settings, &ctx()).unwrap_err();
        assert!(matches!(err, SprintSyncError::Configuration(_)));
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let settings = IntegrationSettings {
            base_url: Some("https://jira.example.com".to_string()),
            user: Some("dev".to_string()),
            ..Default::default()
        };
        let err = resolve(&settings, &ctx()).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_basic_requires_user() {
        let settings = IntegrationSettings {
            base_url: Some("https://jira.example.com".to_string()),
            token: Some("t".to_string()),
            ..Default::default()
        };
        let err = resolve(&settings, &ctx()).unwrap_err();
        assert!(matches!(err, SprintSyncError::Configuration(_)));

        let bearer = IntegrationSettings {
            auth_type: Some("Bearer".to_string()),
            ..settings
        };
        assert!(resolve(&bearer, &ctx()).is_ok());
    }

    #[test]
    fn test_defaults_and_board_ids() {
        let settings = IntegrationSettings::basic("https://jira.example.com", "dev", "t")
            .with_board_ids("3, 1, nope, 3")
            .with_deployment("datacenter")
            .with_sprint_field("customfield_10020");

        let creds = resolve(&settings, &ctx()).unwrap();
        assert_eq!(creds.deployment, Deployment::DataCenter);
        assert_eq!(creds.request_timeout, Duration::from_millis(30_000));
        assert_eq!(creds.sprint_field_id.as_deref(), Some("customfield_10020"));
        assert_eq!(
            creds.board_ids,
            Some([1u64, 3].into_iter().collect::<BTreeSet<_>>())
        );
        assert_eq!(creds.user(), Some("dev"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let settings = IntegrationSettings::basic("https://jira.example.com", "dev", "t");
        assert_eq!(resolve(&settings, &ctx()).unwrap(), resolve(&settings, &ctx()).unwrap());
    }

    #[test]
    fn test_board_override_only_touches_board_ids() {
        let settings = IntegrationSettings::basic("https://jira.example.com", "dev", "t")
            .with_board_ids("1,2");
        let creds = resolve(&settings, &ctx()).unwrap();
        let overridden = creds.clone().with_board_override(Some(vec![42]));

        assert_eq!(
            overridden.board_ids,
            Some([42u64].into_iter().collect::<BTreeSet<_>>())
        );
        assert_eq!(overridden.base_url, creds.base_url);
        assert_eq!(overridden.auth, creds.auth);
        assert_eq!(creds.clone().with_board_override(None), creds);
    }
}
