//! Pure builders for new-ticket type and description.

use crate::intermediary::Issue;

/// Wraps text in the tracker's quote markup.
pub(crate) fn quote(text: &str) -> String {
    format!("{{quote}}{text}{{quote}}")
}

/// Returns the issue types to use for a new ticket, best first.
///
/// All tag-mapped types are returned (sorted) so the caller can mention the
/// ones it did not use. Otherwise a single type is chosen from the repo
/// default, the upstream native type, an `RFE` title, or `Bug`.
#[must_use]
pub fn preferred_types(issue: &Issue) -> Vec<String> {
    let downstream = issue.downstream();

    let mut mapped: Vec<String> = issue
        .tags()
        .iter()
        .filter_map(|tag| downstream.issue_types.get(tag))
        .cloned()
        .collect();
    if !mapped.is_empty() {
        mapped.sort();
        mapped.dedup();
        return mapped;
    }

    let single = if let Some(kind) = &downstream.issue_type {
        kind.clone()
    } else if let Some(kind) = issue.issue_type() {
        kind.to_string()
    } else if issue.upstream_title().contains("RFE") {
        "Story".to_string()
    } else {
        "Bug".to_string()
    };
    vec![single]
}

/// Builds the downstream description for an issue.
///
/// Recomputed on every pass; the lines present depend on the repository's
/// policies.
#[must_use]
pub fn description(issue: &Issue) -> String {
    let downstream = issue.downstream();
    let mut lines = Vec::with_capacity(4);

    if downstream.has_policy("transition") {
        lines.push(format!("Upstream issue status: {}", issue.status()));
    }
    lines.push(format!(
        "[{}] Upstream Reporter: {}",
        issue.id(),
        issue.reporter().fullname
    ));
    if downstream.has_policy("description") {
        lines.push(format!("Upstream description: {}", quote(issue.content())));
    }
    if downstream.has_policy("url") {
        lines.push(format!("Upstream URL: {}", issue.url()));
    }

    lines.join("\n")
}
