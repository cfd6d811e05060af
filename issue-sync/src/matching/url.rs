//! Upstream URL shape checks.

use crate::config::Source;
use url::Url;

/// Returns true if `url` has the shape of an issue or pull/merge request URL
/// on the given service.
///
/// - GitHub: `https://github.com/<owner>/<repo>/(issues|pull)/<n>`
/// - GitLab: `https://<host>/<group>/.../<project>/-/(issues|merge_requests)/<n>`
#[must_use]
pub fn is_valid_upstream_url(source: Source, url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "https" || parsed.query().is_some() || parsed.fragment().is_some() {
        return false;
    }
    let Some(segments) = parsed.path_segments() else {
        return false;
    };
    let segments: Vec<&str> = segments.collect();
    if segments.iter().any(|s| s.is_empty()) {
        return false;
    }

    match source {
        Source::Github => {
            parsed.host_str() == Some("github.com")
                && matches!(segments.as_slice(), [_, _, "issues" | "pull", n] if is_number(n))
        }
        Source::Gitlab => match segments.as_slice() {
            [namespace @ .., _project, "-", "issues" | "merge_requests", n] => {
                !namespace.is_empty() && is_number(n)
            }
            _ => false,
        },
    }
}

fn is_number(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
