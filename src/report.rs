//! Team-bounded sprint reporting
//!
//! Sprint names conventionally start with a team prefix ("ABC Sprint 6").
//! The report keeps each team's most recent sprints, at most `cap` per team,
//! and returns them in one list ordered by end date, newest first.

use crate::config::ReportConfig;
use crate::model::SprintSnapshot;
use crate::store::SprintStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Team key used when a sprint has no usable name
pub const FALLBACK_TEAM: &str = "TEAM";

/// Derive the team key from a sprint name
///
/// The leading ASCII-alphanumeric run, uppercased. Names that start with
/// anything else use the whole trimmed name.
pub fn team_key(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return FALLBACK_TEAM.to_string();
    }

    let prefix: String = name
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();

    if prefix.is_empty() {
        name.to_uppercase()
    } else {
        prefix.to_ascii_uppercase()
    }
}

/// Newest first; sprints without an end date sort last
fn by_end_desc(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Keep at most `cap` of each team's most recent sprints
///
/// The result is ordered by end date descending; equal end dates keep their
/// input order.
pub fn select_per_team(snapshots: &[SprintSnapshot], cap: usize) -> Vec<SprintSnapshot> {
    let mut ordered: Vec<(usize, &SprintSnapshot)> = snapshots.iter().enumerate().collect();
    ordered.sort_by(|a, b| by_end_desc(a.1.end_date, b.1.end_date));

    let mut per_team: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<(usize, &SprintSnapshot)> = Vec::new();
    for (index, snapshot) in ordered {
        let taken = per_team.entry(team_key(&snapshot.name)).or_insert(0);
        if *taken < cap {
            *taken += 1;
            kept.push((index, snapshot));
        }
    }

    kept.sort_by(|a, b| by_end_desc(a.1.end_date, b.1.end_date).then(a.0.cmp(&b.0)));
    kept.into_iter().map(|(_, s)| s.clone()).collect()
}

/// Sprints of one team, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamGroup {
    pub team: String,
    pub sprints: Vec<SprintSnapshot>,
}

/// Group selected sprints by team, teams ordered by their newest sprint
pub fn group_by_team(selected: &[SprintSnapshot]) -> Vec<TeamGroup> {
    let mut groups: Vec<TeamGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for snapshot in selected {
        let team = team_key(&snapshot.name);
        let position = *positions.entry(team.clone()).or_insert_with(|| {
            groups.push(TeamGroup {
                team,
                sprints: Vec::new(),
            });
            groups.len() - 1
        });
        groups[position].sprints.push(snapshot.clone());
    }

    groups
}

/// Load stored sprints and select each team's most recent ones
///
/// `requested` is clamped into the configured per-team bounds.
pub async fn recent_by_team<S: SprintStore + ?Sized>(
    store: &S,
    config: &ReportConfig,
    requested: Option<usize>,
) -> Result<Vec<SprintSnapshot>> {
    let cap = config.clamp_per_team(requested);
    let snapshots = store.sprint_snapshots().await?;
    let selected = select_per_team(&snapshots, cap);

    tracing::debug!(
        cap,
        stored = snapshots.len(),
        selected = selected.len(),
        "Selected recent sprints per team"
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SprintStatus;
    use chrono::TimeZone;

    fn snap(name: &str, end: Option<(i32, u32, u32)>) -> SprintSnapshot {
        SprintSnapshot {
            external_id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            end_date: end.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()),
            status: SprintStatus::Closed,
        }
    }

    fn names(snapshots: &[SprintSnapshot]) -> Vec<&str> {
        snapshots.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_team_key() {
        assert_eq!(team_key("ABC Sprint 5"), "ABC");
        assert_eq!(team_key("  xyz-2024 Sprint 1"), "XYZ");
        assert_eq!(team_key("Team42 S3"), "TEAM42");
        assert_eq!(team_key("#ops week 1"), "#OPS WEEK 1");
        assert_eq!(team_key("   "), "TEAM");
        assert_eq!(team_key(""), "TEAM");
    }

    #[test]
    fn test_one_per_team() {
        let snapshots = vec![
            snap("ABC Sprint 5", Some((2024, 5, 1))),
            snap("ABC Sprint 6", Some((2024, 5, 15))),
            snap("XYZ Sprint 1", Some((2024, 5, 10))),
        ];
        let selected = select_per_team(&snapshots, 1);
        assert_eq!(names(&selected), vec!["ABC Sprint 6", "XYZ Sprint 1"]);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let snapshots = vec![
            snap("ABC Sprint 1", Some((2024, 1, 1))),
            snap("ABC Sprint 3", Some((2024, 3, 1))),
            snap("ABC Sprint 2", Some((2024, 2, 1))),
            snap("XYZ Sprint 9", Some((2024, 2, 15))),
        ];
        let selected = select_per_team(&snapshots, 2);
        assert_eq!(
            names(&selected),
            vec!["ABC Sprint 3", "XYZ Sprint 9", "ABC Sprint 2"]
        );
    }

    #[test]
    fn test_ties_keep_input_order_and_undated_last() {
        let snapshots = vec![
            snap("XYZ Sprint 1", Some((2024, 5, 10))),
            snap("QA Sprint 4", None),
            snap("ABC Sprint 6", Some((2024, 5, 10))),
            snap("OPS Sprint 2", Some((2024, 4, 1))),
        ];
        let selected = select_per_team(&snapshots, 3);
        assert_eq!(
            names(&selected),
            vec!["XYZ Sprint 1", "ABC Sprint 6", "OPS Sprint 2", "QA Sprint 4"]
        );
    }

    #[test]
    fn test_zero_cap_and_empty_input() {
        let snapshots = vec![snap("ABC Sprint 1", Some((2024, 1, 1)))];
        assert!(select_per_team(&snapshots, 0).is_empty());
        assert!(select_per_team(&[], 3).is_empty());
    }

    #[test]
    fn test_group_by_team() {
        let selected = vec![
            snap("ABC Sprint 6", Some((2024, 5, 15))),
            snap("XYZ Sprint 1", Some((2024, 5, 10))),
            snap("abc Sprint 5", Some((2024, 5, 1))),
        ];
        let groups = group_by_team(&selected);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].team, "ABC");
        assert_eq!(names(&groups[0].sprints), vec!["ABC Sprint 6", "abc Sprint 5"]);
        assert_eq!(groups[1].team, "XYZ");
    }

    #[tokio::test]
    async fn test_recent_by_team_clamps_cap() {
        use crate::model::SprintRecord;
        use crate::store::SqliteStore;

        let store = SqliteStore::open_in_memory().unwrap();
        for (id, day) in [(1u32, 1u32), (2, 8), (3, 15)] {
            store
                .upsert_sprint(&SprintRecord {
                    external_id: id.to_string(),
                    name: format!("ABC Sprint {}", id),
                    start_date: None,
                    end_date: Some(Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()),
                    complete_date: None,
                    status: SprintStatus::Closed,
                })
                .await
                .unwrap();
        }

        let config = ReportConfig {
            min_per_team: 1,
            max_per_team: 2,
            default_per_team: 1,
        };
        let selected = recent_by_team(&store, &config, Some(10)).await.unwrap();
        assert_eq!(names(&selected), vec!["ABC Sprint 3", "ABC Sprint 2"]);

        let selected = recent_by_team(&store, &config, None).await.unwrap();
        assert_eq!(names(&selected), vec!["ABC Sprint 3"]);
    }
}
