//! The synchronization workflow.
//!
//! [`SyncEngine`] owns the identity cache and the collaborator handles and is
//! built once per process. Each entity goes through
//! `health check -> match -> reconcile | create` on a fresh tracker session;
//! a tracker error anywhere in that pass reconnects and runs the whole pass
//! once more before giving up on the entity.

mod create;
mod duplicates;
mod error;
mod pull_request;

pub use error::SyncError;

use crate::cache::IdentityCache;
use crate::config::SyncConfig;
use crate::identity::{IdentityLookup, StaticIdentityLookup};
use crate::intermediary::Issue;
use crate::matching::Matcher;
use crate::reconcile::Reconciler;
use crate::remote_links::{JqlRemoteLinkIndex, RemoteLinkIndex, REMOTE_LINK_TITLE};
use crate::tracker::{
    check_health, FieldUpdate, JiraConnector, RemoteLink, Ticket, Tracker, TrackerConnector,
    TrackerError,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

/// What a workflow pass did to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// An existing ticket was reconciled.
    Updated { key: String },
    /// A new ticket was created and reconciled.
    Created { key: String },
    /// A legacy-matched ticket received its remote link.
    Upgraded { key: String },
    /// A pull request was linked to (or re-announced on) a ticket.
    Linked { key: String },
    /// Nothing was written.
    Skipped { reason: String },
}

impl SyncOutcome {
    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Ticket key touched by this pass, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Updated { key }
            | Self::Created { key }
            | Self::Upgraded { key }
            | Self::Linked { key } => Some(key),
            Self::Skipped { .. } => None,
        }
    }
}

/// Process-wide synchronization context.
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    connector: Arc<dyn TrackerConnector>,
    links: Arc<dyn RemoteLinkIndex>,
    identities: Arc<dyn IdentityLookup>,
    cache: Mutex<IdentityCache>,
    /// Upstream URLs whose ticket exists but whose creation steps did not all
    /// complete.
    unfinished: Mutex<HashSet<String>>,
}

impl SyncEngine {
    /// Creates an engine over explicit collaborators.
    pub fn new(
        config: Arc<SyncConfig>,
        connector: Arc<dyn TrackerConnector>,
        links: Arc<dyn RemoteLinkIndex>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        let cache = Mutex::new(IdentityCache::new(config.cache_size));
        Self {
            config,
            connector,
            links,
            identities,
            cache,
            unfinished: Mutex::new(HashSet::new()),
        }
    }

    /// Creates an engine talking to the configured Jira instances, using the
    /// JQL remote-link index and the `[identities]` table.
    #[must_use]
    pub fn from_config(config: Arc<SyncConfig>) -> Self {
        let connector = Arc::new(JiraConnector::new(config.jira.clone()));
        let identities = Arc::new(StaticIdentityLookup::new(config.identities.clone()));
        Self::new(config, connector, Arc::new(JqlRemoteLinkIndex), identities)
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Synchronizes one upstream issue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TrackerDown`] when the health probe fails, and a
    /// tracker error when both attempts of the pass fail.
    pub async fn sync_issue(&self, issue: &Issue) -> Result<SyncOutcome, SyncError> {
        let span = info_span!("sync_issue", url = %issue.url(), upstream = %issue.upstream());
        async {
            info!(title = %issue.upstream_title(), "Considering upstream issue");
            let instance = self.instance(issue.downstream(), issue.upstream())?;
            let instance = instance.as_str();
            self.with_retry(instance, |tracker| self.issue_pass(tracker, issue, instance))
                .await
        }
        .instrument(span)
        .await
    }

    fn instance(
        &self,
        downstream: &crate::config::RepoConfig,
        upstream: &str,
    ) -> Result<String, SyncError> {
        self.config
            .instance_name(downstream)
            .map(str::to_string)
            .ok_or_else(|| SyncError::NoInstance {
                upstream: upstream.to_string(),
            })
    }

    /// Runs `pass` on a fresh session; on a tracker error, reconnects and runs
    /// it exactly once more.
    async fn with_retry<T, F, Fut>(&self, instance: &str, mut pass: F) -> Result<T, SyncError>
    where
        F: FnMut(Arc<dyn Tracker>) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let tracker = self.connector.connect(instance).await?;
        match pass(tracker).await {
            Err(SyncError::Tracker(e)) => {
                warn!(instance, error = %e, "Tracker call failed, retrying with a fresh session");
                let tracker = self.connector.connect(instance).await?;
                pass(tracker).await
            }
            other => other,
        }
    }

    /// Fails with [`SyncError::TrackerDown`] unless the probe finds a linked
    /// ticket. An expired session stays a tracker error so the pass can
    /// reconnect.
    async fn ensure_healthy(&self, tracker: &dyn Tracker, instance: &str) -> Result<(), SyncError> {
        if self.config.develop {
            return Ok(());
        }
        match check_health(tracker).await {
            Ok(true) => return Ok(()),
            Ok(false) => warn!(instance, "Tracker failed its health check"),
            Err(e) if e.is_session_error() => return Err(e.into()),
            Err(e) => warn!(instance, error = %e, "Tracker health check errored"),
        }
        Err(SyncError::TrackerDown {
            instance: instance.to_string(),
        })
    }

    fn reconciler<'a>(&'a self, tracker: &'a dyn Tracker) -> Reconciler<'a> {
        Reconciler::new(
            tracker,
            self.identities.as_ref(),
            &self.config.default_jira_fields,
        )
    }

    fn matcher<'a>(&'a self, tracker: &'a dyn Tracker) -> Matcher<'a> {
        Matcher::new(
            tracker,
            self.links.as_ref(),
            &self.cache,
            &self.config.jira_username,
        )
    }

    async fn issue_pass(
        &self,
        tracker: Arc<dyn Tracker>,
        issue: &Issue,
        instance: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let tracker = tracker.as_ref();
        self.ensure_healthy(tracker, instance).await?;

        let matcher = self.matcher(tracker);
        if let Some(mut ticket) = matcher.find_existing(issue).await? {
            info!(key = %ticket.key, "Found matching ticket");
            if self.config.testing {
                info!(key = %ticket.key, "Testing mode, not updating");
                return Ok(SyncOutcome::skipped("testing"));
            }
            if self.unfinished.lock().await.contains(issue.url()) {
                info!(key = %ticket.key, "Resuming interrupted ticket creation");
                self.finish_creation(tracker, issue, &mut ticket).await?;
                return Ok(SyncOutcome::Created { key: ticket.key });
            }
            self.reconciler(tracker).reconcile(issue, &mut ticket).await?;
            return Ok(SyncOutcome::Updated { key: ticket.key });
        }

        if self.config.legacy_matching {
            if let Some(mut ticket) = matcher.find_legacy(issue).await? {
                info!(key = %ticket.key, "Found legacy ticket");
                if self.config.testing {
                    info!(key = %ticket.key, "Testing mode, not upgrading");
                    return Ok(SyncOutcome::skipped("testing"));
                }
                attach_link(
                    tracker,
                    &mut ticket,
                    RemoteLink::new(issue.url(), REMOTE_LINK_TITLE),
                )
                .await?;
                self.cache.lock().await.insert(issue.url(), ticket.key.clone());
                return Ok(SyncOutcome::Upgraded { key: ticket.key });
            }
        }

        self.create(tracker, issue).await
    }
}

/// Attaches a remote link, then rewrites the description so the tracker
/// re-indexes the ticket and link searches find it.
pub(crate) async fn attach_link(
    tracker: &dyn Tracker,
    ticket: &mut Ticket,
    link: RemoteLink,
) -> Result<(), TrackerError> {
    info!(key = %ticket.key, url = %link.url, title = %link.title, "Attaching remote link");
    tracker.add_remote_link(&ticket.key, &link).await?;

    let nudge = FieldUpdate::Description(format!("{} ", ticket.description));
    tracker.update_field(&ticket.key, &nudge).await?;
    nudge.apply_to(ticket);
    Ok(())
}
