//! Finding the downstream ticket that mirrors an upstream issue.
//!
//! The upstream URL is the only identity that survives between runs, so the
//! lookup is driven by it:
//!
//! 1. the in-process cache of previous matches,
//! 2. otherwise the remote-link index, after checking the URL's shape,
//! 3. with several linked tickets, an ambiguity filter that prefers
//!    candidates whose content refers to the issue and follows dedup pointers
//!    left when duplicates were closed.
//!
//! The filter fails open: if it rejects every candidate, the unfiltered set is
//! used.

mod ambiguity;
mod url;

pub use ambiguity::parse_tracker_timestamp;
pub use url::is_valid_upstream_url;

use crate::cache::IdentityCache;
use crate::intermediary::Issue;
use crate::remote_links::RemoteLinkIndex;
use crate::tracker::{Ticket, Tracker, TrackerError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lookup context for one tracker session.
pub struct Matcher<'a> {
    tracker: &'a dyn Tracker,
    links: &'a dyn RemoteLinkIndex,
    cache: &'a Mutex<IdentityCache>,
    service_account: &'a str,
}

impl<'a> Matcher<'a> {
    /// Creates a matcher. Dedup pointers are only honoured when written by
    /// `service_account`.
    pub fn new(
        tracker: &'a dyn Tracker,
        links: &'a dyn RemoteLinkIndex,
        cache: &'a Mutex<IdentityCache>,
        service_account: &'a str,
    ) -> Self {
        Self {
            tracker,
            links,
            cache,
            service_account,
        }
    }

    /// Returns the ticket believed to mirror `issue`, if any, and caches the
    /// match.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub async fn find_existing(&self, issue: &Issue) -> Result<Option<Ticket>, TrackerError> {
        let url = issue.url();

        let cached = self.cache.lock().await.get(url).map(str::to_string);
        if let Some(key) = cached {
            match self.tracker.ticket(&key).await {
                Ok(ticket) => {
                    debug!(url, key = %ticket.key, "Matched from cache");
                    return Ok(Some(ticket));
                }
                Err(TrackerError::NotFound { .. }) => {
                    warn!(url, key = %key, "Cached ticket no longer exists");
                    self.cache.lock().await.remove(url);
                }
                Err(e) => return Err(e),
            }
        }

        if !is_valid_upstream_url(issue.source(), url) {
            error!(url, source = %issue.source(), "Upstream URL has an unexpected shape");
            return Ok(None);
        }

        let keys = self.links.linked_tickets(self.tracker, url, false).await?;
        let mut candidates = Vec::with_capacity(keys.len());
        for key in keys {
            match self.tracker.ticket(&key).await {
                Ok(ticket) => candidates.push(ticket),
                Err(TrackerError::NotFound { .. }) => {
                    warn!(key = %key, "Linked ticket disappeared");
                }
                Err(e) => return Err(e),
            }
        }

        let chosen = match candidates.len() {
            0 => return Ok(None),
            1 => candidates.pop(),
            count => {
                info!(url, count, "Several tickets link to the same upstream issue");
                self.disambiguate(issue, candidates).await?
            }
        };

        if let Some(ticket) = &chosen {
            self.cache.lock().await.insert(url, ticket.key.clone());
        }
        Ok(chosen)
    }

    async fn disambiguate(
        &self,
        issue: &Issue,
        candidates: Vec<Ticket>,
    ) -> Result<Option<Ticket>, TrackerError> {
        let mut retained: Vec<Ticket> = Vec::new();
        for candidate in &candidates {
            if !ambiguity::is_plausible(candidate, issue) {
                continue;
            }
            let resolved =
                ambiguity::follow_dedup_pointer(self.tracker, candidate, self.service_account)
                    .await?
                    .unwrap_or_else(|| candidate.clone());
            if !retained.iter().any(|t| t.key == resolved.key) {
                retained.push(resolved);
            }
        }

        let mut pool = if retained.is_empty() {
            debug!(url = issue.url(), "Ambiguity filter kept nothing, using all candidates");
            candidates
        } else {
            retained
        };

        if pool.len() > 1 {
            ambiguity::sort_most_recent_first(&mut pool);
        }
        Ok(pool.into_iter().next())
    }

    /// Deprecated lookup through the `External issue URL` field, restricted
    /// to unresolved or duplicate-resolved tickets in the repository's
    /// project/component.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub async fn find_legacy(&self, issue: &Issue) -> Result<Option<Ticket>, TrackerError> {
        let query = legacy_query(issue);
        debug!(query = %query, "Running legacy match");
        Ok(self.tracker.search(&query).await?.into_iter().next())
    }
}

/// Builds the legacy JQL: field/value pairs sorted by field name, joined with
/// `AND`, then the resolution restriction.
fn legacy_query(issue: &Issue) -> String {
    let downstream = issue.downstream();
    let mut pairs: Vec<(&str, &str)> = vec![
        ("External issue URL", issue.url()),
        ("project", downstream.project.as_str()),
    ];
    if let Some(component) = &downstream.component {
        pairs.push(("component", component.as_str()));
    }
    pairs.sort_by_key(|(field, _)| *field);

    let clauses: Vec<String> = pairs
        .iter()
        .map(|(field, value)| format!("'{field}'='{}'", value.replace('\'', "\\'")))
        .collect();
    format!(
        "{} AND (resolution is null OR resolution = Duplicate)",
        clauses.join(" AND ")
    )
}
