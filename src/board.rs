//! Board identifier parsing
//!
//! Users paste either a board link copied from the browser or a comma-separated
//! list of board ids. Both are reduced to numeric ids here. Parsing never fails:
//! input that yields nothing becomes `None`.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref RAPID_VIEW_RE: Regex = Regex::new(r"(?i)rapidView=(\d+)").unwrap();
    static ref BOARD_PATH_RE: Regex = Regex::new(r"(?i)/boards?/(\d+)").unwrap();
}

/// Extract a board id from a board URL
///
/// Precedence: the `rapidView` query parameter, then a `/board/<id>` or
/// `/boards/<id>` path segment. Text that is not a parseable URL is searched
/// for `rapidView=<id>` (and, failing that, a board path) anywhere.
pub fn board_id_from_url(input: &str) -> Option<u64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match Url::parse(input) {
        Ok(url) => {
            let from_query = url
                .query_pairs()
                .find(|(key, _)| key.eq_ignore_ascii_case("rapidView"))
                .and_then(|(_, value)| value.trim().parse::<u64>().ok());

            from_query.or_else(|| board_id_from_path(url.path()))
        }
        Err(_) => capture_id(&RAPID_VIEW_RE, input).or_else(|| capture_id(&BOARD_PATH_RE, input)),
    }
}

fn board_id_from_path(path: &str) -> Option<u64> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.windows(2).find_map(|pair| {
        let marker = pair[0].to_ascii_lowercase();
        if marker == "board" || marker == "boards" {
            pair[1].parse::<u64>().ok()
        } else {
            None
        }
    })
}

fn capture_id(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Parse a comma-separated list of board ids
///
/// Entries are trimmed; anything that is not an integer is dropped. Returns
/// `None` when nothing usable remains. Order is preserved.
pub fn parse_board_list(input: &str) -> Option<Vec<u64>> {
    let ids: Vec<u64> = input
        .split(',')
        .map(str::trim)
        .filter_map(|entry| entry.parse::<u64>().ok())
        .collect();

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Parse free-form board input: a URL-derived id wins over a list
pub fn parse_board_input(input: &str) -> Option<Vec<u64>> {
    board_id_from_url(input)
        .map(|id| vec![id])
        .or_else(|| parse_board_list(input))
}

/// Resolve the per-call board override from a sync trigger
///
/// A board URL that yields an id replaces any id list for that call.
pub fn board_override(board_url: Option<&str>, board_ids: Option<&str>) -> Option<Vec<u64>> {
    board_url
        .and_then(board_id_from_url)
        .map(|id| vec![id])
        .or_else(|| board_ids.and_then(parse_board_input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boards_path_segment() {
        assert_eq!(
            board_id_from_url("https://acme.atlassian.net/jira/software/projects/ABC/boards/42"),
            Some(42)
        );
        assert_eq!(board_id_from_url(".../boards/42"), Some(42));
        assert_eq!(board_id_from_url("https://jira.corp.example/Board/17/backlog"), Some(17));
    }

    #[test]
    fn test_rapid_view_query() {
        assert_eq!(board_id_from_url("?rapidView=7"), Some(7));
        assert_eq!(
            board_id_from_url(
                "https://jira.corp.example/secure/RapidBoard.jspa?rapidView=123&projectKey=ABC"
            ),
            Some(123)
        );
    }

    #[test]
    fn test_rapid_view_beats_path() {
        assert_eq!(
            board_id_from_url("https://acme.atlassian.net/boards/9?rapidView=11"),
            Some(11)
        );
    }

    #[test]
    fn test_url_without_board() {
        assert_eq!(board_id_from_url("https://acme.atlassian.net/browse/ABC-1"), None);
        assert_eq!(board_id_from_url(""), None);
        assert_eq!(board_id_from_url("not a board"), None);
    }

    #[test]
    fn test_list_parsing() {
        assert_eq!(parse_board_list("12, 13, x, 14"), Some(vec![12, 13, 14]));
        assert_eq!(parse_board_list(" 5 "), Some(vec![5]));
        assert_eq!(parse_board_list(""), None);
        assert_eq!(parse_board_list("a, b,,"), None);
    }

    #[test]
    fn test_input_prefers_url() {
        assert_eq!(parse_board_input("12, 13, x, 14"), Some(vec![12, 13, 14]));
        assert_eq!(parse_board_input("?rapidView=7"), Some(vec![7]));
        assert_eq!(parse_board_input(""), None);
    }

    #[test]
    fn test_override_url_wins_over_list() {
        assert_eq!(
            board_override(Some("https://acme.atlassian.net/boards/42"), Some("1,2")),
            Some(vec![42])
        );
        assert_eq!(
            board_override(Some("https://acme.atlassian.net/browse/X-1"), Some("1,2")),
            Some(vec![1, 2])
        );
        assert_eq!(board_override(None, Some("junk")), None);
        assert_eq!(board_override(None, None), None);
    }
}
