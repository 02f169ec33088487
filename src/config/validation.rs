//! Configuration validation
//!
//! Validates sprintsync configuration for correctness:
//! - Page size within what the Agile API honours
//! - Non-zero page cap and worker count
//! - A recent-closed window of at most a century
//! - Per-team report bounds that form a range
//! - A parseable default base URL

use super::app_config::{AppConfig, MAX_PAGE_SIZE, MAX_RECENT_CLOSED_DAYS};
use crate::SprintSyncError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a sprintsync configuration
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.sync.page_size == 0 || config.sync.page_size > MAX_PAGE_SIZE {
        errors.push(ValidationError::new(
            "sync.page_size",
            format!("Must be between 1 and {}", MAX_PAGE_SIZE),
        ));
    }

    if config.sync.max_pages == 0 {
        errors.push(ValidationError::new(
            "sync.max_pages",
            "Must be greater than 0",
        ));
    }

    if config.sync.workers == 0 {
        errors.push(ValidationError::new("sync.workers", "Must be greater than 0"));
    }

    if config.sync.recent_closed_days < 0 {
        errors.push(ValidationError::new(
            "sync.recent_closed_days",
            "Must not be negative",
        ));
    } else if config.sync.recent_closed_days > MAX_RECENT_CLOSED_DAYS {
        errors.push(ValidationError::new(
            "sync.recent_closed_days",
            format!("Must be at most {}", MAX_RECENT_CLOSED_DAYS),
        ));
    }

    if config.sync.request_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "sync.request_timeout_ms",
            "Must be greater than 0",
        ));
    }

    if config.report.min_per_team == 0 {
        errors.push(ValidationError::new(
            "report.min_per_team",
            "Must be greater than 0",
        ));
    }

    if config.report.min_per_team > config.report.max_per_team {
        errors.push(ValidationError::new(
            "report.max_per_team",
            format!(
                "Must be at least min_per_team ({})",
                config.report.min_per_team
            ),
        ));
    }

    if let Some(ref url) = config.default_base_url {
        if let Err(e) = url::Url::parse(url.trim()) {
            errors.push(ValidationError::new(
                "default_base_url",
                format!("Invalid URL '{}': {}", url, e),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert the collected problems into a single error
pub fn validate_config_result(config: &AppConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        SprintSyncError::Other(format!("Invalid configuration: {}", joined))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::new()).is_ok());
    }

    #[test]
    fn test_page_size_above_api_limit() {
        let mut config = AppConfig::new();
        config.sync.page_size = 100;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sync.page_size");
    }

    #[test]
    fn test_recent_closed_days_bounds() {
        let mut config = AppConfig::new();
        config.sync.recent_closed_days = MAX_RECENT_CLOSED_DAYS;
        assert!(validate_config(&config).is_ok());

        config.sync.recent_closed_days = 200_000_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sync.recent_closed_days");

        config.sync.recent_closed_days = -1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_collects_every_problem() {
        let mut config = AppConfig::new();
        config.sync.max_pages = 0;
        config.sync.workers = 0;
        config.report.min_per_team = 10;
        config.report.max_per_team = 2;
        config.default_base_url = Some("not a url".to_string());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"sync.max_pages"));
        assert!(fields.contains(&"sync.workers"));
        assert!(fields.contains(&"report.max_per_team"));
        assert!(fields.contains(&"default_base_url"));
    }

    #[test]
    fn test_result_joins_messages() {
        let mut config = AppConfig::new();
        config.sync.workers = 0;

        let err = validate_config_result(&config).unwrap_err();
        assert!(err.to_string().contains("sync.workers"));
    }
}
