//! Normalized upstream issue.

use super::comment::{Comment, UpstreamStatus, UpstreamUser};
use super::error::IntermediaryError;
use super::markdown::gfm_to_jira;
use super::text::{scrub_content, trim_content, truncate_chars, MAX_TITLE_CHARS};
use crate::config::{RepoConfig, Source, SyncConfig};

/// Raw issue data as fetched from an upstream service.
#[derive(Debug, Clone, Default)]
pub struct UpstreamIssue {
    /// Issue title.
    pub title: String,
    /// Canonical web URL.
    pub url: String,
    /// Body text.
    pub body: String,
    /// Comments in upstream order.
    pub comments: Vec<Comment>,
    /// Label names.
    pub tags: Vec<String>,
    /// Milestone name.
    pub milestone: Option<String>,
    /// Priority from the project board.
    pub priority: Option<String>,
    /// Story points from the project board.
    pub storypoints: Option<String>,
    /// Open/closed state.
    pub status: UpstreamStatus,
    /// Native issue type, where the service has one.
    pub issue_type: Option<String>,
    /// Author.
    pub reporter: UpstreamUser,
    /// Assignees, preferred first.
    pub assignees: Vec<UpstreamUser>,
    /// Service-wide numeric id.
    pub id: u64,
    /// Per-repository issue number.
    pub number: u64,
}

/// An upstream issue, normalized and bound to its downstream configuration.
///
/// Immutable once constructed. `url` is the only field that stays stable for
/// an issue across runs.
#[derive(Debug, Clone)]
pub struct Issue {
    source: Source,
    upstream: String,
    title: String,
    url: String,
    content: String,
    comments: Vec<Comment>,
    tags: Vec<String>,
    fix_version: Vec<Option<String>>,
    priority: Option<String>,
    storypoints: Option<String>,
    status: UpstreamStatus,
    issue_type: Option<String>,
    reporter: UpstreamUser,
    assignee: Vec<UpstreamUser>,
    id: String,
    upstream_id: u64,
    downstream: RepoConfig,
}

impl Issue {
    /// Normalizes `raw` and resolves the downstream configuration for
    /// `(source, upstream)`.
    ///
    /// # Errors
    ///
    /// Returns [`IntermediaryError::UnmappedRepository`] when the repository
    /// is not present in the configuration map.
    pub fn new(
        source: Source,
        upstream: &str,
        raw: UpstreamIssue,
        config: &SyncConfig,
    ) -> Result<Self, IntermediaryError> {
        let downstream = config.repo(source, upstream).cloned().ok_or_else(|| {
            IntermediaryError::UnmappedRepository {
                service: source,
                repo: upstream.to_string(),
            }
        })?;
        Ok(Self::with_downstream(source, upstream, raw, downstream))
    }

    /// Normalizes `raw` against an explicit downstream configuration.
    #[must_use]
    pub fn with_downstream(
        source: Source,
        upstream: &str,
        raw: UpstreamIssue,
        downstream: RepoConfig,
    ) -> Self {
        let milestone = match (&downstream.fix_version_template, raw.milestone) {
            (Some(template), Some(name)) => Some(template.replace("XXX", &name)),
            (_, milestone) => milestone,
        };

        let body = if source == Source::Github && downstream.has_policy("github_markdown") {
            gfm_to_jira(&raw.body)
        } else {
            raw.body
        };

        let comments = raw
            .comments
            .into_iter()
            .map(|comment| Comment {
                body: trim_content(&comment.body),
                ..comment
            })
            .collect();

        Self {
            source,
            upstream: upstream.to_string(),
            title: truncate_chars(&raw.title, MAX_TITLE_CHARS),
            url: raw.url,
            content: scrub_content(&body),
            comments,
            tags: raw.tags,
            fix_version: vec![milestone],
            priority: raw.priority,
            storypoints: raw.storypoints,
            status: raw.status,
            issue_type: raw.issue_type,
            reporter: raw.reporter,
            assignee: raw.assignees,
            id: raw.id.to_string(),
            upstream_id: raw.number,
            downstream,
        }
    }

    /// Upstream service.
    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Upstream repository name, e.g. `org/repo`.
    #[must_use]
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Raw upstream title (at most 254 characters).
    #[must_use]
    pub fn upstream_title(&self) -> &str {
        &self.title
    }

    /// Title as written downstream: `[<repo>] <title>`, capped and trimmed.
    #[must_use]
    pub fn title(&self) -> String {
        display_title(&self.upstream, &self.title)
    }

    /// Canonical upstream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scrubbed body text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Upstream comments.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Upstream label names.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Fix versions derived from the milestone; entries may be absent.
    #[must_use]
    pub fn fix_version(&self) -> &[Option<String>] {
        &self.fix_version
    }

    /// Project-board priority.
    #[must_use]
    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    /// Project-board story points, unvalidated.
    #[must_use]
    pub fn storypoints(&self) -> Option<&str> {
        self.storypoints.as_deref()
    }

    /// Open/closed state.
    #[must_use]
    pub fn status(&self) -> UpstreamStatus {
        self.status
    }

    /// Native upstream issue type.
    #[must_use]
    pub fn issue_type(&self) -> Option<&str> {
        self.issue_type.as_deref()
    }

    /// Author.
    #[must_use]
    pub fn reporter(&self) -> &UpstreamUser {
        &self.reporter
    }

    /// Candidate assignees, preferred first.
    #[must_use]
    pub fn assignee(&self) -> &[UpstreamUser] {
        &self.assignee
    }

    /// Service-wide id, as text.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Per-repository number.
    #[must_use]
    pub fn upstream_id(&self) -> u64 {
        self.upstream_id
    }

    /// Downstream configuration for this issue's repository.
    #[must_use]
    pub fn downstream(&self) -> &RepoConfig {
        &self.downstream
    }
}

/// Builds the downstream display title for an upstream title.
fn display_title(upstream: &str, title: &str) -> String {
    truncate_chars(&format!("[{upstream}] {title}"), MAX_TITLE_CHARS)
        .trim()
        .to_string()
}
