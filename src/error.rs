//! Error types for sprintsync
//!
//! One error enum covers every failure mode of the sync engine. Configuration
//! problems are fatal and raised before any network call; failures reported by
//! the external tracker carry a classified [`ExternalServiceError`].

use std::fmt;
use thiserror::Error;

/// Result type alias for sprintsync operations
pub type Result<T> = std::result::Result<T, SprintSyncError>;

/// Generic message shown when the tracker gave no usable detail
const GENERIC_SERVICE_MESSAGE: &str = "The Jira service returned an unexpected error";

/// Comprehensive error type for sprintsync operations
#[derive(Error, Debug)]
pub enum SprintSyncError {
    /// Integration credentials could not be resolved
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The external tracker rejected or failed a request
    #[error("{0}")]
    ExternalService(#[from] ExternalServiceError),

    /// Storage-level errors that are not raw SQLite failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SprintSyncError {
    /// Message suitable for showing to the person who triggered the sync
    pub fn user_message(&self) -> String {
        match self {
            SprintSyncError::Configuration(msg) => {
                format!("Jira integration is not configured: {}", msg)
            }
            SprintSyncError::ExternalService(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    /// True when the failure came from the external tracker
    pub fn is_external(&self) -> bool {
        matches!(self, SprintSyncError::ExternalService(_))
    }
}

/// Classification of a failed call to the external tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// 401: the token is most likely wrong or expired
    Unauthorized,
    /// 403: the token lacks the required scope
    Forbidden,
    /// 404: the base URL most likely points at the wrong place
    NotFound,
    /// Anything else, including transport failures and timeouts
    Other,
}

impl ServiceErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ServiceErrorKind::Unauthorized,
            403 => ServiceErrorKind::Forbidden,
            404 => ServiceErrorKind::NotFound,
            _ => ServiceErrorKind::Other,
        }
    }

    /// Connection status recorded for this kind of failure
    pub fn as_status(&self) -> &'static str {
        match self {
            ServiceErrorKind::Unauthorized => "unauthorized",
            ServiceErrorKind::Forbidden => "forbidden",
            ServiceErrorKind::NotFound => "not_found",
            ServiceErrorKind::Other => "error",
        }
    }
}

/// Error reported by (or while talking to) the external tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalServiceError {
    pub kind: ServiceErrorKind,
    pub status: Option<u16>,
    pub message: Option<String>,
}

impl ExternalServiceError {
    /// Build an error from an HTTP status and the provider's message, if any
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        Self {
            kind: ServiceErrorKind::from_status(status),
            status: Some(status),
            message: message.filter(|m| !m.trim().is_empty()),
        }
    }

    /// Build an error for a failure that never produced an HTTP status
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Other,
            status: None,
            message: Some(message.into()),
        }
    }

    fn detail(&self) -> String {
        match (self.status, self.message.as_deref()) {
            (Some(status), Some(msg)) => format!("HTTP {}: {}", status, msg),
            (Some(status), None) => format!("HTTP {}", status),
            (None, Some(msg)) => msg.to_string(),
            (None, None) => GENERIC_SERVICE_MESSAGE.to_string(),
        }
    }

    /// Message suitable for showing to the person who triggered the sync
    pub fn user_message(&self) -> String {
        match self.kind {
            ServiceErrorKind::Unauthorized => {
                "Jira rejected the credentials; check the API token".to_string()
            }
            ServiceErrorKind::Forbidden => {
                "The Jira token does not have permission to read boards and sprints".to_string()
            }
            ServiceErrorKind::NotFound => {
                "Jira endpoint not found; check the configured base URL".to_string()
            }
            ServiceErrorKind::Other => self
                .message
                .clone()
                .unwrap_or_else(|| GENERIC_SERVICE_MESSAGE.to_string()),
        }
    }
}

impl fmt::Display for ExternalServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Jira request failed ({}): {}", self.kind.as_status(), self.detail())
    }
}

impl std::error::Error for ExternalServiceError {}

impl From<reqwest::Error> for ExternalServiceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ExternalServiceError::from_status(status.as_u16(), Some(e.to_string())),
            None if e.is_timeout() => ExternalServiceError::transport(format!("request timed out: {}", e)),
            None => ExternalServiceError::transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ServiceErrorKind::from_status(401), ServiceErrorKind::Unauthorized);
        assert_eq!(ServiceErrorKind::from_status(403), ServiceErrorKind::Forbidden);
        assert_eq!(ServiceErrorKind::from_status(404), ServiceErrorKind::NotFound);
        assert_eq!(ServiceErrorKind::from_status(500), ServiceErrorKind::Other);
        assert_eq!(ServiceErrorKind::from_status(429), ServiceErrorKind::Other);
    }

    #[test]
    fn test_user_message_prefers_provider_detail() {
        let err = ExternalServiceError::from_status(500, Some("Board 9 is corrupt".to_string()));
        assert_eq!(err.user_message(), "Board 9 is corrupt");

        let err = ExternalServiceError::from_status(502, Some("   ".to_string()));
        assert_eq!(err.message, None);
        assert_eq!(err.user_message(), GENERIC_SERVICE_MESSAGE);
    }

    #[test]
    fn test_configuration_message_is_specific() {
        let err = SprintSyncError::Configuration("no API token".to_string());
        assert!(err.user_message().contains("not configured"));
        assert!(err.user_message().contains("no API token"));
        assert!(!err.is_external());
    }

    #[test]
    fn test_display_includes_status() {
        let err = SprintSyncError::from(ExternalServiceError::from_status(404, None));
        assert!(err.is_external());
        assert_eq!(err.to_string(), "Jira request failed (not_found): HTTP 404");
    }
}
