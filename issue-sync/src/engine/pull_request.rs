//! Linking pull requests to the ticket named in their `Relates to JIRA` cookie.

use super::{attach_link, SyncEngine, SyncError, SyncOutcome};
use crate::intermediary::{PrSuffix, PullRequest};
use crate::tracker::{comment_once, transition_to, RemoteLink, Tracker, TrackerError};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

impl SyncEngine {
    /// Links a pull request to its ticket and applies the `pr_updates`
    /// transitions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TrackerDown`] when the health probe fails, and a
    /// tracker error when both attempts fail.
    pub async fn sync_pull_request(&self, pr: &PullRequest) -> Result<SyncOutcome, SyncError> {
        let span = info_span!("sync_pull_request", url = %pr.url(), upstream = %pr.upstream());
        async {
            info!(title = %pr.upstream_title(), suffix = %pr.suffix(), "Considering upstream pull request");
            if self.config.testing {
                info!("Testing mode, not linking");
                return Ok(SyncOutcome::skipped("testing"));
            }
            let Some(key) = pr.jira_key() else {
                info!("No tracker key referenced");
                return Ok(SyncOutcome::skipped("no tracker key"));
            };

            let instance = self.instance(pr.downstream(), pr.upstream())?;
            let instance = instance.as_str();
            self.with_retry(instance, |tracker| self.pr_pass(tracker, pr, key, instance))
                .await
        }
        .instrument(span)
        .await
    }

    async fn pr_pass(
        &self,
        tracker: Arc<dyn Tracker>,
        pr: &PullRequest,
        key: &str,
        instance: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let tracker = tracker.as_ref();
        self.ensure_healthy(tracker, instance).await?;

        let mut found = match tracker.search(&format!("key = {key}")).await {
            Ok(found) => found,
            Err(TrackerError::Rejected { .. } | TrackerError::NotFound { .. }) => {
                warn!(key, "Referenced ticket does not exist");
                return Ok(SyncOutcome::skipped("unknown ticket"));
            }
            Err(e) => return Err(e.into()),
        };
        if found.len() != 1 {
            warn!(key, count = found.len(), "Expected exactly one ticket");
            return Ok(SyncOutcome::skipped("unknown ticket"));
        }
        let mut ticket = found.remove(0);

        let comment = link_comment(tracker, pr).await?;
        let linked = tracker
            .remote_links(&ticket.key)
            .await?
            .iter()
            .any(|link| link.url == pr.url());

        if !linked {
            if comment_once(tracker, &ticket.key, &comment).await? {
                info!(key = %ticket.key, "Commented on linked ticket");
            }
            attach_link(
                tracker,
                &mut ticket,
                RemoteLink::new(pr.url(), format!("[PR] {}", pr.title())),
            )
            .await?;
        }

        let downstream = pr.downstream();
        if pr.suffix() == PrSuffix::Merged {
            if let Some(status) = downstream.merge_transition() {
                transition_to(tracker, &ticket.key, status).await?;
            }
        }
        if !linked && pr.suffix() == PrSuffix::Mentioned {
            if let Some(status) = downstream.link_transition() {
                transition_to(tracker, &ticket.key, status).await?;
            }
        }

        Ok(SyncOutcome::Linked { key: ticket.key })
    }
}

/// Renders the comment announcing a pull request event. The reporter becomes
/// a `[~key]` mention when the directory knows their display name.
async fn link_comment(tracker: &dyn Tracker, pr: &PullRequest) -> Result<String, TrackerError> {
    let title = pr.title();
    let url = pr.url();
    Ok(match pr.suffix() {
        PrSuffix::Closed => format!("Merge request [{title}| {url}] was closed."),
        PrSuffix::Reopened => format!("Merge request [{title}| {url}] was reopened."),
        PrSuffix::Merged => format!("Merge request [{title}| {url}] was merged!"),
        PrSuffix::Mentioned => {
            let fullname = &pr.reporter().fullname;
            let reporter = tracker
                .search_users(fullname)
                .await?
                .into_iter()
                .find(|u| &u.display_name == fullname)
                .map_or_else(|| fullname.clone(), |u| format!("[~{}]", u.key));
            format!("{reporter} mentioned this issue in merge request [{title}| {url}].")
        }
    })
}
