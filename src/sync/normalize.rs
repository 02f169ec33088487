//! Raw Jira payloads to canonical records
//!
//! Pure functions only. Missing or malformed upstream values never fail the
//! mapping; they fall back to documented defaults.

use crate::integrations::{JiraIssue, JiraSprint};
use crate::model::{IssueRecord, SprintRecord, SprintStatus};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

const DEFAULT_PRIORITY: &str = "MEDIUM";
const DEFAULT_ISSUE_STATUS: &str = "TODO";
const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

lazy_static! {
    /// Data Center serializes sprint field entries as
    /// `com.atlassian.greenhopper.service.sprint.Sprint@1a2b[id=12,rapidViewId=3,...]`
    static ref LEGACY_SPRINT_ID_RE: Regex = Regex::new(r"\bid=(\d+)").unwrap();
}

/// Map a raw sprint to its canonical record
pub fn normalize_sprint(raw: &JiraSprint) -> SprintRecord {
    SprintRecord {
        external_id: raw.id.to_string(),
        name: raw.name.trim().to_string(),
        start_date: raw.start_date.as_deref().and_then(parse_jira_datetime),
        end_date: raw.end_date.as_deref().and_then(parse_jira_datetime),
        complete_date: raw.complete_date.as_deref().and_then(parse_jira_datetime),
        status: raw
            .state
            .as_deref()
            .map(SprintStatus::parse)
            .unwrap_or(SprintStatus::Unknown),
    }
}

/// Map a raw issue to its canonical record
///
/// `sprint_field_id` names the custom field that carries sprint membership;
/// when set, the sprint ids it reports are kept on the record.
pub fn normalize_issue(raw: &JiraIssue, sprint_field_id: Option<&str>) -> IssueRecord {
    let fields = &raw.fields;

    let reported_sprint_ids = sprint_field_id
        .and_then(|field| fields.extra.get(field))
        .map(reported_sprint_ids)
        .unwrap_or_default();

    IssueRecord {
        external_id: raw.id.clone(),
        key: raw.key.clone(),
        summary: fields.summary.clone().unwrap_or_default(),
        description: fields.description.as_ref().and_then(description_text),
        status: issue_status(
            fields.status.as_ref().and_then(|s| s.status_category.as_ref()).and_then(|c| c.key.as_deref()),
            fields.status.as_ref().and_then(|s| s.name.as_deref()),
        ),
        assignee: fields
            .assignee
            .as_ref()
            .and_then(|a| a.display_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        priority: fields
            .priority
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.to_ascii_uppercase())
            .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
        reported_sprint_ids,
    }
}

/// Canonical issue status from the status category key, else the status name
pub fn issue_status(category_key: Option<&str>, name: Option<&str>) -> String {
    match category_key.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        Some("new") => return "TODO".to_string(),
        Some("indeterminate") => return "IN_PROGRESS".to_string(),
        Some("done") => return "DONE".to_string(),
        _ => {}
    }

    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_uppercase(),
        None => DEFAULT_ISSUE_STATUS.to_string(),
    }
}

/// Whole days elapsed since `start`, rounded up and never negative
pub fn gross_time(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    let Some(start) = start else {
        return 0;
    };
    let elapsed = (now - start).num_milliseconds();
    if elapsed <= 0 {
        return 0;
    }
    (elapsed + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

/// Parse a Jira timestamp
///
/// Cloud sends RFC 3339 (`2024-05-01T09:00:00.000Z`); Data Center sends a
/// numeric offset without a colon (`2024-05-01T09:00:00.000+0200`).
pub fn parse_jira_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn description_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(_) => flatten_adf(value),
        _ => String::new(),
    };
    (!text.is_empty()).then_some(text)
}

/// Flatten an Atlassian Document Format tree into plain text
///
/// Block nodes end with a newline; `hardBreak` becomes a newline.
pub fn flatten_adf(doc: &Value) -> String {
    let mut out = String::new();
    collect_adf_text(doc, &mut out);

    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn collect_adf_text(node: &Value, out: &mut String) {
    let node_type = node.get("type").and_then(Value::as_str).unwrap_or_default();

    if node_type == "hardBreak" {
        out.push('\n');
        return;
    }
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push_str(text);
    }
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            collect_adf_text(child, out);
        }
    }

    if matches!(
        node_type,
        "paragraph" | "heading" | "codeBlock" | "blockquote" | "listItem" | "rule"
    ) && !out.ends_with('\n')
    {
        out.push('\n');
    }
}

/// Sprint ids carried by a sprint custom field value
///
/// Handles Cloud objects (`{"id": 12, ...}`), arrays of them, and the legacy
/// Data Center string form.
pub fn reported_sprint_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(reported_sprint_ids).collect(),
        Value::Object(map) => match map.get("id") {
            Some(Value::Number(n)) => vec![n.to_string()],
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        },
        Value::String(s) => LEGACY_SPRINT_ID_RE
            .captures(s)
            .and_then(|caps| caps.get(1))
            .map(|m| vec![m.as_str().to_string()])
            .unwrap_or_default(),
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn raw_issue(fields: Value) -> JiraIssue {
        serde_json::from_value(json!({ "id": "10001", "key": "ABC-1", "fields": fields })).unwrap()
    }

    #[test]
    fn test_sprint_state_mapping() {
        let raw: JiraSprint = serde_json::from_value(json!({
            "id": 37,
            "name": " ABC Sprint 6 ",
            "state": "active",
            "startDate": "2024-05-01T09:00:00.000Z",
            "endDate": "2024-05-15T17:00:00.000+0200"
        }))
        .unwrap();

        let sprint = normalize_sprint(&raw);
        assert_eq!(sprint.external_id, "37");
        assert_eq!(sprint.name, "ABC Sprint 6");
        assert_eq!(sprint.status, SprintStatus::Active);
        assert_eq!(
            sprint.start_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            sprint.end_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 15, 15, 0, 0).unwrap())
        );

        let future: JiraSprint =
            serde_json::from_value(json!({ "id": 38, "name": "ABC Sprint 7", "state": "future" }))
                .unwrap();
        assert_eq!(normalize_sprint(&future).status, SprintStatus::Unknown);

        let stateless: JiraSprint =
            serde_json::from_value(json!({ "id": 39, "name": "x", "startDate": "garbage" })).unwrap();
        let sprint = normalize_sprint(&stateless);
        assert_eq!(sprint.status, SprintStatus::Unknown);
        assert_eq!(sprint.start_date, None);
    }

    #[test]
    fn test_issue_status_mapping() {
        assert_eq!(issue_status(Some("new"), Some("Open")), "TODO");
        assert_eq!(issue_status(Some("indeterminate"), Some("In Review")), "IN_PROGRESS");
        assert_eq!(issue_status(Some("done"), Some("Closed")), "DONE");
        assert_eq!(issue_status(None, Some("In  Review")), "IN_REVIEW");
        assert_eq!(issue_status(Some("undefined"), Some("Blocked")), "BLOCKED");
        assert_eq!(issue_status(None, None), "TODO");
        assert_eq!(issue_status(None, Some("  ")), "TODO");
    }

    #[test]
    fn test_issue_defaults() {
        let issue = normalize_issue(&raw_issue(json!({ "summary": "Login page" })), None);
        assert_eq!(issue.external_id, "10001");
        assert_eq!(issue.key, "ABC-1");
        assert_eq!(issue.status, "TODO");
        assert_eq!(issue.priority, "MEDIUM");
        assert_eq!(issue.assignee, None);
        assert_eq!(issue.description, None);
        assert!(issue.reported_sprint_ids.is_empty());
    }

    #[test]
    fn test_issue_full_mapping() {
        let issue = normalize_issue(
            &raw_issue(json!({
                "summary": "Login page",
                "description": "Plain text body",
                "status": { "name": "In Progress", "statusCategory": { "key": "indeterminate" } },
                "assignee": { "displayName": "Dana Lee" },
                "priority": { "name": "High" },
                "customfield_10020": [{ "id": 7, "name": "ABC Sprint 5" }, { "id": 8 }]
            })),
            Some("customfield_10020"),
        );
        assert_eq!(issue.status, "IN_PROGRESS");
        assert_eq!(issue.assignee.as_deref(), Some("Dana Lee"));
        assert_eq!(issue.priority, "HIGH");
        assert_eq!(issue.description.as_deref(), Some("Plain text body"));
        assert_eq!(issue.reported_sprint_ids, vec!["7", "8"]);
    }

    #[test]
    fn test_adf_description() {
        let doc = json!({
            "type": "doc",
            "version": 1,
            "content": [
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "First line" },
                    { "type": "hardBreak" },
                    { "type": "text", "text": "second line" }
                ]},
                { "type": "bulletList", "content": [
                    { "type": "listItem", "content": [
                        { "type": "paragraph", "content": [{ "type": "text", "text": "item" }] }
                    ]}
                ]}
            ]
        });
        assert_eq!(flatten_adf(&doc), "First line\nsecond line\nitem");

        let empty = json!({ "type": "doc", "version": 1, "content": [] });
        assert_eq!(description_text(&empty), None);
    }

    #[test]
    fn test_legacy_sprint_field() {
        let value = json!([
            "com.atlassian.greenhopper.service.sprint.Sprint@5f1b[id=12,rapidViewId=3,state=CLOSED,name=ABC Sprint 5]"
        ]);
        assert_eq!(reported_sprint_ids(&value), vec!["12"]);
        assert!(reported_sprint_ids(&Value::Null).is_empty());
    }

    #[test]
    fn test_gross_time_rounds_up() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(gross_time(Some(start), start), 0);
        assert_eq!(gross_time(Some(start), start + Duration::hours(1)), 1);
        assert_eq!(gross_time(Some(start), start + Duration::days(3)), 3);
        assert_eq!(
            gross_time(Some(start), start + Duration::days(3) + Duration::seconds(1)),
            4
        );
    }

    #[test]
    fn test_gross_time_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        assert_eq!(gross_time(Some(start), start - Duration::days(5)), 0);
        assert_eq!(gross_time(None, start), 0);
    }

    #[test]
    fn test_parse_jira_datetime_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
        assert_eq!(parse_jira_datetime("2024-05-01T07:00:00Z"), Some(expected));
        assert_eq!(parse_jira_datetime("2024-05-01T09:00:00.000+0200"), Some(expected));
        assert_eq!(parse_jira_datetime("2024-05-01T09:00:00.000+02:00"), Some(expected));
        assert_eq!(parse_jira_datetime(""), None);
        assert_eq!(parse_jira_datetime("yesterday"), None);
    }
}
