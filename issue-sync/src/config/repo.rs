//! Per-repository downstream configuration.

use super::policy::{FieldPolicy, PrPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Upstream source-hosting services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// github.com
    Github,
    /// GitLab (any host).
    Gitlab,
}

impl Source {
    /// Returns the lowercase name used in configuration and event topics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of upstream entities a repository can sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Issues are created/updated downstream.
    Issue,
    /// Pull requests are linked to the ticket they mention.
    #[serde(alias = "pull_request")]
    PullRequest,
}

/// Mapping from a GitHub project item field to a downstream field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectFieldConfig {
    /// Field name on the GitHub project board.
    pub gh_field: String,

    /// Explicit value table (upstream option -> downstream option).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Downstream configuration for one upstream repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoConfig {
    /// Downstream project key.
    pub project: String,

    /// Downstream component name.
    #[serde(default)]
    pub component: Option<String>,

    /// Which upstream entity kinds to sync.
    #[serde(default)]
    pub sync: Vec<SyncKind>,

    /// Directory user that receives tickets nobody else can be found for.
    #[serde(default)]
    pub owner: Option<String>,

    /// Status newly created tickets are moved to.
    #[serde(default)]
    pub default_status: Option<String>,

    /// Named tracker instance; falls back to `default_jira_instance`.
    #[serde(default)]
    pub jira_instance: Option<String>,

    /// Default ticket type.
    #[serde(default, rename = "type")]
    pub issue_type: Option<String>,

    /// Upstream tag -> ticket type.
    #[serde(default)]
    pub issue_types: BTreeMap<String, String>,

    /// Labels set on every created ticket.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Raw downstream fields set on creation. String values may contain the
    /// `[remote-link]` placeholder.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,

    /// Milestone rewrite, `XXX` is replaced with the milestone name.
    #[serde(default)]
    pub fix_version_template: Option<String>,

    /// Epic the created ticket is attached to.
    #[serde(default)]
    pub epic_link: Option<String>,

    /// QA contact set on created tickets.
    #[serde(default)]
    pub qa_contact: Option<String>,

    /// Ordered issue field policies.
    #[serde(default)]
    pub issue_updates: Vec<FieldPolicy>,

    /// Pull request linking policies.
    #[serde(default)]
    pub pr_updates: Vec<PrPolicy>,

    /// GitHub project board field mappings, keyed by `storypoints`/`priority`.
    #[serde(default)]
    pub github_project_fields: BTreeMap<String, ProjectFieldConfig>,

    /// Project board the field values are read from. Without it, an issue
    /// on exactly one board uses that board.
    #[serde(default)]
    pub github_project_number: Option<u64>,
}

impl RepoConfig {
    /// Returns true if the repository syncs the given entity kind.
    #[must_use]
    pub fn syncs(&self, kind: SyncKind) -> bool {
        self.sync.contains(&kind)
    }

    /// Returns the first policy with the given configuration name.
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<&FieldPolicy> {
        self.issue_updates.iter().find(|p| p.name() == name)
    }

    /// Returns true if the named policy is opted in.
    #[must_use]
    pub fn has_policy(&self, name: &str) -> bool {
        self.policy(name).is_some()
    }

    /// Returns the configured transition target, if any.
    #[must_use]
    pub fn transition_target(&self) -> Option<&str> {
        self.issue_updates.iter().find_map(|p| match p {
            FieldPolicy::Transition { target } => target.as_deref(),
            _ => None,
        })
    }

    /// Returns the status for a pull request transition policy.
    #[must_use]
    pub fn merge_transition(&self) -> Option<&str> {
        self.pr_updates.iter().find_map(|p| match p {
            PrPolicy::MergeTransition(status) => Some(status.as_str()),
            PrPolicy::LinkTransition(_) => None,
        })
    }

    /// Returns the status a newly linked pull request moves the ticket to.
    #[must_use]
    pub fn link_transition(&self) -> Option<&str> {
        self.pr_updates.iter().find_map(|p| match p {
            PrPolicy::LinkTransition(status) => Some(status.as_str()),
            PrPolicy::MergeTransition(_) => None,
        })
    }
}

/// Upstream fetch filters for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssueFilter {
    /// `open`, `closed` or `all`.
    #[serde(default)]
    pub state: Option<String>,

    /// At least one of these labels must be present.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Milestone number the item must carry.
    #[serde(default)]
    pub milestone: Option<u64>,
}

impl IssueFilter {
    /// Returns true if an event item passes the filter. Listing applies the
    /// same filter server-side.
    #[must_use]
    pub fn admits(&self, state: &str, labels: &[String], milestone: Option<u64>) -> bool {
        let state_ok = match self.state.as_deref() {
            None | Some("all") => true,
            Some(expected) => expected.eq_ignore_ascii_case(state),
        };
        let labels_ok =
            self.labels.is_empty() || labels.iter().any(|label| self.labels.contains(label));
        let milestone_ok = self.milestone.is_none() || self.milestone == milestone;
        state_ok && labels_ok && milestone_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_admits_matching_items() {
        let filter = IssueFilter {
            state: Some("open".to_string()),
            labels: vec!["bug".to_string(), "crash".to_string()],
            milestone: Some(4),
        };
        let labels = vec!["crash".to_string()];

        assert!(filter.admits("open", &labels, Some(4)));
        assert!(!filter.admits("closed", &labels, Some(4)));
        assert!(!filter.admits("open", &["docs".to_string()], Some(4)));
        assert!(!filter.admits("open", &labels, None));
        assert!(IssueFilter::default().admits("closed", &[], None));
    }

    #[test]
    fn reads_transition_targets() {
        let repo: RepoConfig = toml::from_str(
            r#"
project = "FACTORY"
issue_updates = [{ transition = "Closed" }, "title"]
pr_updates = [{ merge_transition = "Done" }]
"#,
        )
        .unwrap();

        assert_eq!(repo.transition_target(), Some("Closed"));
        assert_eq!(repo.merge_transition(), Some("Done"));
        assert_eq!(repo.link_transition(), None);
        assert!(repo.has_policy("title"));
        assert!(!repo.has_policy("comments"));
    }

    #[test]
    fn accepts_pull_request_alias() {
        let repo: RepoConfig = toml::from_str(
            r#"
project = "FACTORY"
sync = ["issue", "pullrequest"]
"#,
        )
        .unwrap();

        assert!(repo.syncs(SyncKind::Issue));
        assert!(repo.syncs(SyncKind::PullRequest));
    }
}
