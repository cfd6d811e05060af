//! GitHub REST/GraphQL adapter.

use super::error::{is_rate_limit_message, UpstreamError};
use super::project::{ProjectItem, ProjectItemsResponse, PROJECT_ITEMS_QUERY};
use super::{resolve_people, UpstreamSource};
use crate::config::IssueFilter;
use crate::intermediary::{
    Comment, UpstreamIssue, UpstreamPullRequest, UpstreamStatus, UpstreamUser,
};
use crate::rate_limit::ensure_core_rate_limit;
use async_trait::async_trait;
use octocrab::models::IssueState;
use octocrab::{params, Octocrab, Page};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info_span, warn, Instrument};

/// Maximum items per page.
const RESULTS_PER_PAGE: u8 = 100;

/// Public profile fields used for display names.
#[derive(Debug, Deserialize)]
struct Profile {
    login: String,
    #[serde(default)]
    name: Option<String>,
}

/// Reads issues, pull requests and profiles from github.com.
#[derive(Debug, Clone)]
pub struct GithubSource {
    octocrab: Octocrab,
}

impl GithubSource {
    /// Creates a client, authenticated when a token is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: Option<&str>) -> Result<Self, UpstreamError> {
        let builder = Octocrab::builder();
        let octocrab = match token {
            Some(token) => builder.personal_token(token.to_string()).build()?,
            None => {
                warn!("No github_token found, requests will be rate-limited");
                builder.build()?
            }
        };
        Ok(Self { octocrab })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_octocrab(octocrab: Octocrab) -> Self {
        Self { octocrab }
    }

    /// Follows `next` links until exhausted, checking the rate limit before
    /// each page.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        repo: &str,
        first: Page<T>,
    ) -> Result<Vec<T>, UpstreamError> {
        let mut page = first;
        let mut items = std::mem::take(&mut page.items);
        while page.next.is_some() {
            ensure_core_rate_limit(&self.octocrab).await?;
            let Some(mut next) = self
                .octocrab
                .get_page::<T>(&page.next)
                .await
                .map_err(|e| classify(e, repo))?
            else {
                break;
            };
            items.append(&mut next.items);
            page = next;
        }
        Ok(items)
    }

    async fn issue_from_model(
        &self,
        repo: &str,
        issue: octocrab::models::issues::Issue,
    ) -> Result<UpstreamIssue, UpstreamError> {
        let comments = if issue.comments == 0 {
            Vec::new()
        } else {
            self.comments(repo, issue.number).await?
        };

        let mut raw = UpstreamIssue {
            title: issue.title,
            url: issue.html_url.to_string(),
            body: issue.body.unwrap_or_default(),
            comments,
            tags: issue.labels.into_iter().map(|l| l.name).collect(),
            milestone: issue.milestone.map(|m| m.title),
            priority: None,
            storypoints: None,
            status: state_of(&issue.state),
            issue_type: None,
            reporter: handle_only(&issue.user.login),
            assignees: issue
                .assignees
                .iter()
                .map(|a| handle_only(&a.login))
                .collect(),
            id: issue.id.into_inner(),
            number: issue.number,
        };

        let mut people: Vec<&mut UpstreamUser> = std::iter::once(&mut raw.reporter)
            .chain(raw.assignees.iter_mut())
            .collect();
        resolve_people(self, &mut people).await?;
        Ok(raw)
    }

    async fn pull_from_model(
        &self,
        repo: &str,
        pr: octocrab::models::pulls::PullRequest,
    ) -> Result<UpstreamPullRequest, UpstreamError> {
        let comments = if pr.comments.unwrap_or_default() == 0 {
            Vec::new()
        } else {
            self.comments(repo, pr.number).await?
        };

        let mut raw = UpstreamPullRequest {
            title: pr.title.unwrap_or_default(),
            url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
            body: pr.body,
            comments,
            reporter: pr
                .user
                .map(|u| handle_only(&u.login))
                .unwrap_or_default(),
            assignees: pr
                .assignees
                .unwrap_or_default()
                .iter()
                .map(|a| handle_only(&a.login))
                .collect(),
            number: pr.number,
            merged: pr.merged_at.is_some(),
            action: "open".to_string(),
        };

        let mut people: Vec<&mut UpstreamUser> = std::iter::once(&mut raw.reporter)
            .chain(raw.assignees.iter_mut())
            .collect();
        resolve_people(self, &mut people).await?;
        Ok(raw)
    }
}

#[async_trait]
impl UpstreamSource for GithubSource {
    async fn issues(
        &self,
        repo: &str,
        filter: &IssueFilter,
    ) -> Result<Vec<UpstreamIssue>, UpstreamError> {
        let span = info_span!("list_issues", repo = %repo);
        async {
            let (owner, name) = split_repo(repo)?;
            ensure_core_rate_limit(&self.octocrab).await?;

            let handler = self.octocrab.issues(owner, name);
            let mut request = handler
                .list()
                .state(state_param(filter))
                .per_page(RESULTS_PER_PAGE);
            if !filter.labels.is_empty() {
                request = request.labels(&filter.labels);
            }
            if let Some(milestone) = filter.milestone {
                request = request.milestone(milestone);
            }
            let first = request.send().await.map_err(|e| classify(e, repo))?;
            let listed = self.collect_pages(repo, first).await?;

            let mut issues = Vec::with_capacity(listed.len());
            for issue in listed {
                if issue.pull_request.is_some() || issue.html_url.path().contains("/pull/") {
                    debug!(number = issue.number, "Skipping pull request in issue listing");
                    continue;
                }
                issues.push(self.issue_from_model(repo, issue).await?);
            }
            debug!(count = issues.len(), "Fetched issues");
            Ok(issues)
        }
        .instrument(span)
        .await
    }

    async fn pull_requests(
        &self,
        repo: &str,
        filter: &IssueFilter,
    ) -> Result<Vec<UpstreamPullRequest>, UpstreamError> {
        let span = info_span!("list_pull_requests", repo = %repo);
        async {
            let (owner, name) = split_repo(repo)?;
            ensure_core_rate_limit(&self.octocrab).await?;

            let first = self
                .octocrab
                .pulls(owner, name)
                .list()
                .state(state_param(filter))
                .per_page(RESULTS_PER_PAGE)
                .send()
                .await
                .map_err(|e| classify(e, repo))?;
            let listed = self.collect_pages(repo, first).await?;

            let mut pulls = Vec::with_capacity(listed.len());
            for pr in listed {
                pulls.push(self.pull_from_model(repo, pr).await?);
            }
            debug!(count = pulls.len(), "Fetched pull requests");
            Ok(pulls)
        }
        .instrument(span)
        .await
    }

    async fn comments(&self, repo: &str, number: u64) -> Result<Vec<Comment>, UpstreamError> {
        let (owner, name) = split_repo(repo)?;
        ensure_core_rate_limit(&self.octocrab).await?;

        let first = self
            .octocrab
            .issues(owner, name)
            .list_comments(number)
            .per_page(RESULTS_PER_PAGE)
            .send()
            .await
            .map_err(|e| classify(e, repo))?;
        let listed = self.collect_pages(repo, first).await?;

        let mut authors: Vec<UpstreamUser> =
            listed.iter().map(|c| handle_only(&c.user.login)).collect();
        let mut people: Vec<&mut UpstreamUser> = authors.iter_mut().collect();
        resolve_people(self, &mut people).await?;

        let mut comments = Vec::with_capacity(listed.len());
        for (comment, author) in listed.into_iter().zip(authors) {
            comments.push(Comment {
                author: author.login,
                name: author.fullname,
                body: comment.body.unwrap_or_default(),
                id: comment.id.into_inner().to_string(),
                date_created: comment.created_at,
                changed: comment.updated_at.filter(|at| *at != comment.created_at),
            });
        }
        Ok(comments)
    }

    async fn user(&self, login: &str) -> Result<UpstreamUser, UpstreamError> {
        ensure_core_rate_limit(&self.octocrab).await?;
        let profile: Profile = self
            .octocrab
            .get(format!("/users/{login}"), None::<&()>)
            .await
            .map_err(|e| classify(e, login))?;
        let fullname = profile
            .name
            .filter(|n| !n.is_empty() && n != "None")
            .unwrap_or_else(|| profile.login.clone());
        Ok(UpstreamUser::new(profile.login, fullname))
    }

    async fn project_items(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<Option<Vec<ProjectItem>>, UpstreamError> {
        let (owner, name) = split_repo(repo)?;
        let payload = json!({
            "query": PROJECT_ITEMS_QUERY,
            "variables": { "orgname": owner, "reponame": name, "issuenumber": number },
        });
        let response: ProjectItemsResponse = self
            .octocrab
            .graphql(&payload)
            .await
            .map_err(|e| classify(e, repo))?;
        Ok(response.into_items())
    }
}

/// Splits `owner/name` at the last slash.
fn split_repo(repo: &str) -> Result<(&str, &str), UpstreamError> {
    repo.rsplit_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
        .ok_or_else(|| UpstreamError::InvalidRepository(repo.to_string()))
}

fn state_param(filter: &IssueFilter) -> params::State {
    match filter.state.as_deref() {
        Some("closed") => params::State::Closed,
        Some("all") => params::State::All,
        _ => params::State::Open,
    }
}

fn state_of(state: &IssueState) -> UpstreamStatus {
    match state {
        IssueState::Closed => UpstreamStatus::Closed,
        _ => UpstreamStatus::Open,
    }
}

fn handle_only(login: &str) -> UpstreamUser {
    UpstreamUser::new(login, login)
}

/// Maps GitHub's rate-limit responses to [`UpstreamError::RateLimitExceeded`].
fn classify(error: octocrab::Error, repo: &str) -> UpstreamError {
    if is_rate_limit_message(&error.to_string()) {
        UpstreamError::RateLimitExceeded {
            repo: repo.to_string(),
        }
    } else {
        UpstreamError::GitHubError(error)
    }
}
