//! Upstream entity acquisition.
//!
//! [`UpstreamSource`] is what the runner and the event handler fetch through.
//! [`GithubSource`] implements it over `octocrab`, checking the core rate
//! limit before every page.

mod error;
mod github;
mod payload;
mod project;

pub use error::UpstreamError;
pub use github::GithubSource;
pub use payload::{
    event_suffix, EventKind, EventPayload, IssuePayload, PullRequestPayload, RepositoryPayload,
};
pub use project::{ProjectItem, ProjectRef};

use crate::config::{IssueFilter, RepoConfig};
use crate::intermediary::{Comment, UpstreamIssue, UpstreamUser};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// A source-hosting service the engine reads from.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Every issue in `repo` admitted by `filter`, pull requests excluded,
    /// with comments and display names filled in.
    async fn issues(
        &self,
        repo: &str,
        filter: &IssueFilter,
    ) -> Result<Vec<UpstreamIssue>, UpstreamError>;

    /// Every pull request in `repo` admitted by `filter`.
    async fn pull_requests(
        &self,
        repo: &str,
        filter: &IssueFilter,
    ) -> Result<Vec<crate::intermediary::UpstreamPullRequest>, UpstreamError>;

    /// Comment thread of an issue or pull request.
    async fn comments(&self, repo: &str, number: u64) -> Result<Vec<Comment>, UpstreamError>;

    /// Profile of an account; the display name falls back to the handle.
    async fn user(&self, login: &str) -> Result<UpstreamUser, UpstreamError>;

    /// Project board cards of an issue, `None` if the issue could not be
    /// resolved.
    async fn project_items(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<Option<Vec<ProjectItem>>, UpstreamError>;
}

/// Replaces handles with profile display names, looking each account up once.
///
/// # Errors
///
/// Returns the first profile lookup failure.
pub async fn resolve_people<S: UpstreamSource + ?Sized>(
    source: &S,
    users: &mut [&mut UpstreamUser],
) -> Result<(), UpstreamError> {
    let mut seen: HashMap<String, UpstreamUser> = HashMap::new();
    for user in users.iter_mut() {
        if let Some(known) = seen.get(&user.login) {
            **user = known.clone();
            continue;
        }
        let resolved = source.user(&user.login).await?;
        seen.insert(user.login.clone(), resolved.clone());
        **user = resolved;
    }
    Ok(())
}

/// Fills `priority`/`storypoints` from the project board when the
/// repository opts into `github_project_fields`.
///
/// # Errors
///
/// Only rate-limit failures propagate; anything else leaves the values unset.
pub async fn add_project_values<S: UpstreamSource + ?Sized>(
    source: &S,
    repo: &str,
    raw: &mut UpstreamIssue,
    downstream: &RepoConfig,
) -> Result<(), UpstreamError> {
    if !project::wants_project_values(downstream) {
        return Ok(());
    }
    raw.priority = None;
    raw.storypoints = None;

    let items = match source.project_items(repo, raw.number).await {
        Ok(Some(items)) => items,
        Ok(None) => {
            info!(repo, issue = raw.number, "Issue not found on GitHub project query");
            return Ok(());
        }
        Err(e) if e.is_rate_limit() => return Err(e),
        Err(e) => {
            info!(repo, issue = raw.number, error = %e, "Could not fetch project values");
            return Ok(());
        }
    };

    if let Some(item) = project::select_item(&items, downstream.github_project_number) {
        project::apply_item(item, &downstream.github_project_fields, raw);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted upstream for runner and handler tests.

    use super::*;
    use crate::intermediary::UpstreamPullRequest;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub issues: BTreeMap<String, Vec<UpstreamIssue>>,
        pub pulls: BTreeMap<String, Vec<UpstreamPullRequest>>,
        pub comments: Vec<Comment>,
        pub names: BTreeMap<String, String>,
        pub project_items: Option<Vec<ProjectItem>>,
        /// Issue listings that fail with a rate-limit error before succeeding.
        pub rate_limited: AtomicUsize,
        pub issue_calls: AtomicUsize,
        pub user_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UpstreamSource for FakeSource {
        async fn issues(
            &self,
            repo: &str,
            _filter: &IssueFilter,
        ) -> Result<Vec<UpstreamIssue>, UpstreamError> {
            self.issue_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .rate_limited
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(UpstreamError::RateLimitExceeded {
                    repo: repo.to_string(),
                });
            }
            Ok(self.issues.get(repo).cloned().unwrap_or_default())
        }

        async fn pull_requests(
            &self,
            repo: &str,
            _filter: &IssueFilter,
        ) -> Result<Vec<UpstreamPullRequest>, UpstreamError> {
            Ok(self.pulls.get(repo).cloned().unwrap_or_default())
        }

        async fn comments(&self, _repo: &str, _number: u64) -> Result<Vec<Comment>, UpstreamError> {
            Ok(self.comments.clone())
        }

        async fn user(&self, login: &str) -> Result<UpstreamUser, UpstreamError> {
            self.user_calls.lock().unwrap().push(login.to_string());
            let name = self.names.get(login).map_or(login, String::as_str);
            Ok(UpstreamUser::new(login, name))
        }

        async fn project_items(
            &self,
            _repo: &str,
            _number: u64,
        ) -> Result<Option<Vec<ProjectItem>>, UpstreamError> {
            Ok(self.project_items.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSource;
    use super::*;
    use crate::config::ProjectFieldConfig;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn resolves_each_account_once() {
        let source = FakeSource {
            names: BTreeMap::from([("octocat".to_string(), "Mona Lisa".to_string())]),
            ..Default::default()
        };
        let mut reporter = UpstreamUser::new("octocat", "octocat");
        let mut first = UpstreamUser::new("octocat", "octocat");
        let mut second = UpstreamUser::new("hubot", "hubot");

        resolve_people(&source, &mut [&mut reporter, &mut first, &mut second])
            .await
            .unwrap();

        assert_eq!(reporter.fullname, "Mona Lisa");
        assert_eq!(first.fullname, "Mona Lisa");
        assert_eq!(second.fullname, "hubot");
        assert_eq!(source.user_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn project_values_need_the_policy() {
        let source = FakeSource::default();
        let mut raw = UpstreamIssue {
            priority: Some("stale".to_string()),
            ..Default::default()
        };
        let downstream = RepoConfig {
            github_project_fields: BTreeMap::from([(
                "priority".to_string(),
                ProjectFieldConfig::default(),
            )]),
            ..Default::default()
        };

        add_project_values(&source, "org/repo", &mut raw, &downstream)
            .await
            .unwrap();

        assert_eq!(raw.priority.as_deref(), Some("stale"));
    }
}
