//! Narrowing several linked tickets down to one.

use crate::intermediary::Issue;
use crate::tracker::{Ticket, Tracker, TrackerError};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static DEDUP_POINTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Marking as duplicate of (\w+-\d+)").expect("valid dedup pointer regex")
});

/// Parses a tracker timestamp such as `2019-07-09T18:18:36.480+0000`,
/// accepting RFC 3339 as well.
#[must_use]
pub fn parse_tracker_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

/// Returns true if the candidate's content ties it to this issue: the
/// upstream id appears in its description, or its summary is the bare title,
/// the display title, or `[<anything>] <title>`.
pub(super) fn is_plausible(candidate: &Ticket, issue: &Issue) -> bool {
    if candidate.description.contains(issue.id()) {
        return true;
    }
    if candidate.summary == issue.upstream_title() || candidate.summary == issue.title() {
        return true;
    }

    let pattern = format!(r"\[[^\s]*\] {}", regex::escape(issue.upstream_title()));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(&candidate.summary),
        Err(e) => {
            warn!(error = %e, "Could not build title pattern");
            false
        }
    }
}

/// Follows a dedup pointer left on `candidate` by `service_account`.
///
/// Returns the referenced ticket, or `None` if there is no pointer or it
/// points at a ticket that no longer exists.
pub(super) async fn follow_dedup_pointer(
    tracker: &dyn Tracker,
    candidate: &Ticket,
    service_account: &str,
) -> Result<Option<Ticket>, TrackerError> {
    let comments = tracker.comments(&candidate.key).await?;
    let target = comments
        .iter()
        .filter(|c| c.author == service_account)
        .find_map(|c| DEDUP_POINTER.captures(&c.body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let Some(target) = target else {
        return Ok(None);
    };
    if target == candidate.key {
        return Ok(None);
    }

    debug!(from = %candidate.key, to = %target, "Following dedup pointer");
    match tracker.ticket(&target).await {
        Ok(ticket) => Ok(Some(ticket)),
        Err(TrackerError::NotFound { .. }) => {
            warn!(from = %candidate.key, to = %target, "Dedup pointer target is gone");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Orders tickets most recently updated first. Unparseable timestamps sort
/// last; ties keep their relative order.
pub(super) fn sort_most_recent_first(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        let a = parse_tracker_timestamp(&a.updated);
        let b = parse_tracker_timestamp(&b.updated);
        b.cmp(&a)
    });
}
