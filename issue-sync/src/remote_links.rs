//! Which downstream tickets link to an upstream URL.

use crate::tracker::{Tracker, TrackerError};
use async_trait::async_trait;

/// Title given to the remote link that ties a ticket to its upstream issue.
pub const REMOTE_LINK_TITLE: &str = "Upstream issue";

/// Answers "which downstream tickets carry a remote link to this URL?".
#[async_trait]
pub trait RemoteLinkIndex: Send + Sync {
    /// Returns the keys of tickets linked to `url`. With `unresolved_only`,
    /// tickets in a done status category are excluded.
    async fn linked_tickets(
        &self,
        tracker: &dyn Tracker,
        url: &str,
        unresolved_only: bool,
    ) -> Result<Vec<String>, TrackerError>;
}

/// Index answered by the tracker's own `linkedIssuesOfRemote` JQL function.
#[derive(Debug, Clone, Copy, Default)]
pub struct JqlRemoteLinkIndex;

impl JqlRemoteLinkIndex {
    /// Builds the query for tickets linked to `url`.
    #[must_use]
    pub fn query(url: &str, unresolved_only: bool) -> String {
        let mut query = format!(
            "issueFunction in linkedIssuesOfRemote(\"{REMOTE_LINK_TITLE}\") and \
             issueFunction in linkedIssuesOfRemote(\"{}\")",
            url.replace('"', "\\\"")
        );
        if unresolved_only {
            query.push_str(" and statusCategory != Done");
        }
        query
    }
}

#[async_trait]
impl RemoteLinkIndex for JqlRemoteLinkIndex {
    async fn linked_tickets(
        &self,
        tracker: &dyn Tracker,
        url: &str,
        unresolved_only: bool,
    ) -> Result<Vec<String>, TrackerError> {
        let tickets = tracker.search(&Self::query(url, unresolved_only)).await?;
        Ok(tickets.into_iter().map(|t| t.key).collect())
    }
}
