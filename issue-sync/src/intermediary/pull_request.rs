//! Normalized upstream pull/merge request.

use super::comment::{Comment, UpstreamUser};
use super::error::IntermediaryError;
use super::text::{scrub_content, trim_content, truncate_chars, MAX_TITLE_CHARS};
use crate::config::{RepoConfig, Source, SyncConfig};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static JIRA_COOKIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Relates to JIRA: (\w*-\d*)").expect("valid jira cookie regex"));

/// What happened upstream to trigger this pull request event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrSuffix {
    /// Opened, edited or commented on.
    Mentioned,
    /// Closed without merging.
    Closed,
    /// Reopened.
    Reopened,
    /// Closed by merging.
    Merged,
}

impl PrSuffix {
    /// Derives the suffix from an event action such as `closed` or
    /// `reopened`.
    #[must_use]
    pub fn from_action(action: &str, merged: bool) -> Self {
        if action.contains("reopened") {
            Self::Reopened
        } else if action.contains("closed") {
            if merged {
                Self::Merged
            } else {
                Self::Closed
            }
        } else {
            Self::Mentioned
        }
    }
}

impl fmt::Display for PrSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mentioned => "mentioned",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::Merged => "merged",
        })
    }
}

/// Raw pull request data as fetched from an upstream service.
#[derive(Debug, Clone, Default)]
pub struct UpstreamPullRequest {
    /// Title.
    pub title: String,
    /// Canonical web URL.
    pub url: String,
    /// Description.
    pub body: Option<String>,
    /// Comments in upstream order.
    pub comments: Vec<Comment>,
    /// Author.
    pub reporter: UpstreamUser,
    /// Assignees, preferred first.
    pub assignees: Vec<UpstreamUser>,
    /// Per-repository number.
    pub number: u64,
    /// Whether the pull request has been merged.
    pub merged: bool,
    /// Event action that triggered processing (`opened`, `closed`, ...).
    pub action: String,
}

/// An upstream pull request, normalized and bound to its downstream
/// configuration.
#[derive(Debug, Clone)]
pub struct PullRequest {
    source: Source,
    upstream: String,
    title: String,
    url: String,
    content: Option<String>,
    comments: Vec<Comment>,
    reporter: UpstreamUser,
    assignee: Vec<UpstreamUser>,
    id: String,
    jira_key: Option<String>,
    suffix: PrSuffix,
    downstream: RepoConfig,
}

impl PullRequest {
    /// Normalizes `raw` and resolves the downstream configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IntermediaryError::UnmappedRepository`] when the repository
    /// is not mapped.
    pub fn new(
        source: Source,
        upstream: &str,
        raw: UpstreamPullRequest,
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
        raw: UpstreamPullRequest,
        downstream: RepoConfig,
    ) -> Self {
        let comments: Vec<Comment> = raw
            .comments
            .into_iter()
            .map(|comment| Comment {
                body: trim_content(&comment.body),
                ..comment
            })
            .collect();
        let jira_key = find_jira_key(raw.body.as_deref(), &comments);

        Self {
            source,
            upstream: upstream.to_string(),
            title: truncate_chars(&raw.title, MAX_TITLE_CHARS),
            url: raw.url,
            content: raw.body.filter(|b| !b.is_empty()).map(|b| scrub_content(&b)),
            comments,
            reporter: raw.reporter,
            assignee: raw.assignees,
            id: raw.number.to_string(),
            jira_key,
            suffix: PrSuffix::from_action(&raw.action, raw.merged),
            downstream,
        }
    }

    /// Upstream service.
    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Upstream repository name.
    #[must_use]
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Raw title.
    #[must_use]
    pub fn upstream_title(&self) -> &str {
        &self.title
    }

    /// Display title, `[<repo>] <title>`.
    #[must_use]
    pub fn title(&self) -> String {
        format!("[{}] {}", self.upstream, self.title)
    }

    /// Canonical upstream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scrubbed description.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Upstream comments.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Author.
    #[must_use]
    pub fn reporter(&self) -> &UpstreamUser {
        &self.reporter
    }

    /// Assignees.
    #[must_use]
    pub fn assignee(&self) -> &[UpstreamUser] {
        &self.assignee
    }

    /// Pull request number, as text.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tracker key named by a `Relates to JIRA: <KEY>` cookie.
    #[must_use]
    pub fn jira_key(&self) -> Option<&str> {
        self.jira_key.as_deref()
    }

    /// Triggering transition.
    #[must_use]
    pub fn suffix(&self) -> PrSuffix {
        self.suffix
    }

    /// Downstream configuration.
    #[must_use]
    pub fn downstream(&self) -> &RepoConfig {
        &self.downstream
    }
}

/// Finds the first `Relates to JIRA: <KEY>` cookie, newest comment first,
/// then the description.
fn find_jira_key(content: Option<&str>, comments: &[Comment]) -> Option<String> {
    comments
        .iter()
        .rev()
        .map(|c| c.body.as_str())
        .chain(content)
        .flat_map(|text| JIRA_COOKIE.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|key| key.len() > 1)
        .map(str::to_string)
}
