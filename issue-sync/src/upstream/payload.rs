//! Webhook event bodies.

use super::error::UpstreamError;
use crate::intermediary::{UpstreamIssue, UpstreamPullRequest, UpstreamStatus, UpstreamUser};
use serde::Deserialize;

/// Entity an event topic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An issue was opened, edited, labeled, closed, ...
    Issue,
    /// A comment on an issue or on a pull request.
    IssueComment,
    /// A pull request was opened, edited, reopened or closed.
    PullRequest,
}

impl EventKind {
    /// Classifies a topic such as `org.example.prod.github.issue.opened` or
    /// a bare suffix such as `github.pull_request`.
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        match event_suffix(topic) {
            "github.issue.comment" | "github.issue_comment" => Some(Self::IssueComment),
            "github.issues" => Some(Self::Issue),
            s if s.starts_with("github.issue.") => Some(Self::Issue),
            "github.pull_request" => Some(Self::PullRequest),
            s if s.starts_with("github.pull_request.") => Some(Self::PullRequest),
            _ => None,
        }
    }
}

/// Strips the bus prefix (`<org>.<app>.<env>.`) from a topic.
#[must_use]
pub fn event_suffix(topic: &str) -> &str {
    if topic.starts_with("github.") {
        return topic;
    }
    topic.splitn(4, '.').nth(3).unwrap_or_default()
}

/// Account fields present in event bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    /// Handle.
    pub login: String,
}

impl UserPayload {
    fn to_user(&self) -> UpstreamUser {
        UpstreamUser::new(&self.login, &self.login)
    }
}

/// Repository the event happened in.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
    /// Repository name without owner.
    pub name: String,
    /// Owner account.
    pub owner: UserPayload,
}

impl RepositoryPayload {
    /// `owner/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.login, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MilestonePayload {
    pub title: String,
    #[serde(default)]
    pub number: Option<u64>,
}

/// The `issue` object of issue and comment events.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<LabelPayload>,
    #[serde(default)]
    pub milestone: Option<MilestonePayload>,
    pub user: UserPayload,
    #[serde(default)]
    pub assignees: Vec<UserPayload>,
    /// Number of comments; the thread itself is fetched separately.
    #[serde(default)]
    pub comments: u64,
    /// Present when the issue is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl IssuePayload {
    /// Label names.
    #[must_use]
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Milestone number, for filtering.
    #[must_use]
    pub fn milestone_number(&self) -> Option<u64> {
        self.milestone.as_ref().and_then(|m| m.number)
    }

    /// True if the issue object describes a pull request.
    #[must_use]
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some() || self.html_url.contains("/pull/")
    }

    /// Raw issue with handles standing in for display names and no comments.
    #[must_use]
    pub fn to_upstream(&self) -> UpstreamIssue {
        UpstreamIssue {
            title: self.title.clone(),
            url: self.html_url.clone(),
            body: self.body.clone().unwrap_or_default(),
            comments: Vec::new(),
            tags: self.label_names(),
            milestone: self.milestone.as_ref().map(|m| m.title.clone()),
            priority: None,
            storypoints: None,
            status: UpstreamStatus::parse(&self.state),
            issue_type: None,
            reporter: self.user.to_user(),
            assignees: self.assignees.iter().map(UserPayload::to_user).collect(),
            id: self.id,
            number: self.number,
        }
    }

    /// Raw pull request for a comment event on a pull request.
    #[must_use]
    pub fn to_upstream_pull_request(&self) -> UpstreamPullRequest {
        UpstreamPullRequest {
            title: self.title.clone(),
            url: self.html_url.clone(),
            body: self.body.clone(),
            comments: Vec::new(),
            reporter: self.user.to_user(),
            assignees: self.assignees.iter().map(UserPayload::to_user).collect(),
            number: self.number,
            merged: false,
            action: "commented".to_string(),
        }
    }
}

/// The `pull_request` object of pull request events.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    pub user: UserPayload,
    #[serde(default)]
    pub assignees: Vec<UserPayload>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub comments: u64,
}

impl PullRequestPayload {
    /// Raw pull request for the given event action.
    #[must_use]
    pub fn to_upstream(&self, action: &str) -> UpstreamPullRequest {
        UpstreamPullRequest {
            title: self.title.clone(),
            url: self.html_url.clone(),
            body: self.body.clone(),
            comments: Vec::new(),
            reporter: self.user.to_user(),
            assignees: self.assignees.iter().map(UserPayload::to_user).collect(),
            number: self.number,
            merged: self.merged,
            action: action.to_string(),
        }
    }
}

/// Event body as delivered by the bus.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub action: Option<String>,
    pub repository: RepositoryPayload,
    #[serde(default)]
    pub issue: Option<IssuePayload>,
    #[serde(default)]
    pub pull_request: Option<PullRequestPayload>,
}

impl EventPayload {
    /// Decodes an event body.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Payload`] if required fields are missing.
    pub fn from_value(body: serde_json::Value) -> Result<Self, UpstreamError> {
        serde_json::from_value(body).map_err(|e| UpstreamError::Payload(e.to_string()))
    }

    /// The event action, falling back to the last topic segment.
    #[must_use]
    pub fn action_for(&self, topic: &str) -> String {
        self.action.clone().unwrap_or_else(|| {
            let suffix = event_suffix(topic);
            suffix.rsplit('.').next().unwrap_or(suffix).to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_topics() {
        let cases = [
            ("org.fedoraproject.prod.github.issue.opened", Some(EventKind::Issue)),
            ("org.fedoraproject.prod.github.issue.comment", Some(EventKind::IssueComment)),
            ("github.issue_comment", Some(EventKind::IssueComment)),
            ("github.issues", Some(EventKind::Issue)),
            ("github.pull_request", Some(EventKind::PullRequest)),
            ("org.fedoraproject.prod.github.pull_request.closed", Some(EventKind::PullRequest)),
            ("org.fedoraproject.prod.github.push", None),
            ("short", None),
        ];
        for (topic, expected) in cases {
            assert_eq!(EventKind::from_topic(topic), expected, "{topic}");
        }
    }

    #[test]
    fn decodes_issue_event() {
        let payload = EventPayload::from_value(json!({
            "action": "labeled",
            "repository": { "name": "repo", "owner": { "login": "org" } },
            "issue": {
                "id": 99, "number": 4, "title": "Crash", "html_url": "https://github.com/org/repo/issues/4",
                "body": null, "state": "closed",
                "labels": [{ "name": "bug" }],
                "milestone": { "title": "1.0", "number": 2 },
                "user": { "login": "octocat" },
                "assignees": [{ "login": "hubot" }],
                "comments": 0
            }
        }))
        .unwrap();

        assert_eq!(payload.repository.full_name(), "org/repo");
        let issue = payload.issue.unwrap();
        assert!(!issue.is_pull_request());
        assert_eq!(issue.milestone_number(), Some(2));

        let raw = issue.to_upstream();
        assert_eq!(raw.status, UpstreamStatus::Closed);
        assert_eq!(raw.tags, vec!["bug".to_string()]);
        assert_eq!(raw.milestone.as_deref(), Some("1.0"));
        assert_eq!(raw.body, "");
        assert_eq!(raw.assignees[0].login, "hubot");
    }

    #[test]
    fn action_falls_back_to_topic() {
        let payload = EventPayload::from_value(json!({
            "repository": { "name": "repo", "owner": { "login": "org" } }
        }))
        .unwrap();
        assert_eq!(payload.action_for("org.example.prod.github.pull_request.reopened"), "reopened");
    }

    #[test]
    fn rejects_body_without_repository() {
        let err = EventPayload::from_value(json!({ "action": "opened" })).unwrap_err();
        assert!(matches!(err, UpstreamError::Payload(_)));
    }
}
