//! Bus event dispatch.
//!
//! Each event arrives as a topic plus a JSON body. The topic picks the entity
//! kind, the body is decoded and enriched through the upstream source, and
//! the resulting entity goes through the workflow. One event is handled at a
//! time.

mod error;

pub use error::HandlerError;

use crate::config::{RepoConfig, Source, SyncKind};
use crate::engine::{SyncEngine, SyncOutcome};
use crate::intermediary::{Issue, PullRequest, UpstreamIssue, UpstreamPullRequest, UpstreamUser};
use crate::upstream::{
    add_project_values, resolve_people, EventKind, EventPayload, IssuePayload, UpstreamError,
    UpstreamSource,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};

/// One line of the event stream.
#[derive(Debug, Clone, Deserialize)]
pub struct BusEvent {
    /// Topic, e.g. `org.fedoraproject.prod.github.issue.opened`.
    pub topic: String,
    /// Event body.
    #[serde(alias = "msg")]
    pub body: serde_json::Value,
}

/// Dispatches bus events to the workflow.
pub struct EventHandler {
    engine: Arc<SyncEngine>,
    source: Arc<dyn UpstreamSource>,
    lock: Mutex<()>,
}

impl EventHandler {
    /// Creates a handler sharing `engine` with other modes.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>, source: Arc<dyn UpstreamSource>) -> Self {
        Self {
            engine,
            source,
            lock: Mutex::new(()),
        }
    }

    /// Handles one event. Returns `None` when the event maps to nothing this
    /// process syncs.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Upstream`] for undecodable bodies or failed
    /// enrichment, and [`HandlerError::Sync`] when the workflow fails.
    pub async fn handle(
        &self,
        topic: &str,
        body: serde_json::Value,
    ) -> Result<Option<SyncOutcome>, HandlerError> {
        let _guard = self.lock.lock().await;
        let span = info_span!("handle_event", topic = %topic);
        async {
            let Some(kind) = EventKind::from_topic(topic) else {
                debug!("Ignoring event kind");
                return Ok(None);
            };
            let payload = EventPayload::from_value(body)?;
            let repo = payload.repository.full_name();
            let Some(downstream) = self.engine.config().repo(Source::Github, &repo) else {
                debug!(repo = %repo, "Repository is not mapped");
                return Ok(None);
            };

            match kind {
                EventKind::Issue => self.issue_event(&repo, downstream, &payload).await,
                EventKind::IssueComment => {
                    let issue = required_issue(&payload)?;
                    if !issue.is_pull_request() {
                        return self.issue_event(&repo, downstream, &payload).await;
                    }
                    if payload.action.as_deref() == Some("deleted") {
                        debug!("Ignoring deleted pull request comment");
                        return Ok(None);
                    }
                    let raw = issue.to_upstream_pull_request();
                    self.pull_request_event(&repo, downstream, raw, issue.comments)
                        .await
                }
                EventKind::PullRequest => {
                    let Some(pr) = &payload.pull_request else {
                        return Err(missing("pull_request").into());
                    };
                    let raw = pr.to_upstream(&payload.action_for(topic));
                    self.pull_request_event(&repo, downstream, raw, pr.comments)
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn issue_event(
        &self,
        repo: &str,
        downstream: &RepoConfig,
        payload: &EventPayload,
    ) -> Result<Option<SyncOutcome>, HandlerError> {
        if !downstream.syncs(SyncKind::Issue) {
            debug!(repo, "Repository does not sync issues");
            return Ok(None);
        }
        let issue = required_issue(payload)?;
        if issue.is_pull_request() {
            debug!(url = %issue.html_url, "Issue event is for a pull request, ignoring");
            return Ok(None);
        }
        let filter = self.engine.config().github_filter(repo);
        if !filter.admits(&issue.state, &issue.label_names(), issue.milestone_number()) {
            info!(url = %issue.html_url, "Issue does not pass the repository filter");
            return Ok(None);
        }

        let mut raw: UpstreamIssue = issue.to_upstream();
        if issue.comments > 0 {
            raw.comments = self.source.comments(repo, issue.number).await?;
        }
        self.resolve(&mut raw.reporter, &mut raw.assignees).await?;
        add_project_values(self.source.as_ref(), repo, &mut raw, downstream).await?;

        let issue = Issue::with_downstream(Source::Github, repo, raw, downstream.clone());
        Ok(Some(self.engine.sync_issue(&issue).await?))
    }

    async fn pull_request_event(
        &self,
        repo: &str,
        downstream: &RepoConfig,
        mut raw: UpstreamPullRequest,
        comment_count: u64,
    ) -> Result<Option<SyncOutcome>, HandlerError> {
        if !downstream.syncs(SyncKind::PullRequest) {
            debug!(repo, "Repository does not sync pull requests");
            return Ok(None);
        }
        if comment_count > 0 {
            raw.comments = self.source.comments(repo, raw.number).await?;
        }
        self.resolve(&mut raw.reporter, &mut raw.assignees).await?;

        let pr = PullRequest::with_downstream(Source::Github, repo, raw, downstream.clone());
        Ok(Some(self.engine.sync_pull_request(&pr).await?))
    }

    async fn resolve(
        &self,
        reporter: &mut UpstreamUser,
        assignees: &mut [UpstreamUser],
    ) -> Result<(), UpstreamError> {
        let mut people: Vec<&mut UpstreamUser> = std::iter::once(reporter)
            .chain(assignees.iter_mut())
            .collect();
        resolve_people(self.source.as_ref(), &mut people).await
    }
}

fn missing(field: &str) -> UpstreamError {
    UpstreamError::Payload(format!("missing field `{field}`"))
}

fn required_issue(payload: &EventPayload) -> Result<&IssuePayload, UpstreamError> {
    payload.issue.as_ref().ok_or_else(|| missing("issue"))
}
