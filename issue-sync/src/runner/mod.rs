//! Batch modes over every mapped GitHub repository.
//!
//! Initialization fetches each repository's issues (then pull requests) and
//! runs them through the workflow one at a time. The first failing entity
//! aborts the run, except for GitHub's rate-limit refusal, which sleeps the
//! cooldown and restarts the batch from the first repository.
//!
//! Listening reads one JSON event per line and hands it to an
//! [`EventHandler`]; only a tracker outage stops it.

mod config;
mod error;

pub use config::RunnerConfig;
pub use error::RunnerError;

use crate::config::{RepoConfig, Source, SyncConfig, SyncKind};
use crate::engine::SyncEngine;
use crate::handler::{BusEvent, EventHandler};
use crate::intermediary::{Issue, PullRequest};
use crate::summary::{ProcessingResult, RunSummary};
use crate::upstream::{add_project_values, GithubSource, UpstreamSource};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Runs the batch modes.
pub struct Runner {
    config: RunnerConfig,
    engine: Arc<SyncEngine>,
    source: Arc<dyn UpstreamSource>,
}

impl Runner {
    /// Builds a runner over GitHub and the configured Jira instances.
    ///
    /// # Errors
    ///
    /// Returns an error if the GitHub client cannot be built.
    pub fn new(config: RunnerConfig, sync: Arc<SyncConfig>) -> Result<Self, RunnerError> {
        let source = GithubSource::new(sync.github_token.as_deref())?;
        let engine = SyncEngine::from_config(sync);
        Ok(Self::with_parts(config, Arc::new(engine), Arc::new(source)))
    }

    /// Builds a runner over explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: RunnerConfig,
        engine: Arc<SyncEngine>,
        source: Arc<dyn UpstreamSource>,
    ) -> Self {
        Self {
            config,
            engine,
            source,
        }
    }

    /// Syncs every issue, then every pull request, of the covered
    /// repositories.
    ///
    /// # Errors
    ///
    /// Returns the first entity failure or a non-rate-limit upstream error.
    pub async fn initialize(&self) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary::new(self.engine.config().testing);

        info!(testing = summary.dry_run, "Initializing issues");
        self.until_done(SyncKind::Issue, &mut summary).await?;
        info!("Done with GitHub issue initialization");

        info!("Initializing pull requests");
        self.until_done(SyncKind::PullRequest, &mut summary).await?;
        info!("Done with GitHub pull request initialization");

        Ok(summary)
    }

    /// Handles events read line by line from `input` until it ends.
    /// Undecodable lines are skipped and per-event failures are counted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or an event finds the tracker down.
    pub async fn listen<R>(&self, input: R) -> Result<RunSummary, RunnerError>
    where
        R: AsyncBufRead + Unpin,
    {
        let handler = EventHandler::new(self.engine.clone(), self.source.clone());
        let mut summary = RunSummary::new(self.engine.config().testing);
        let mut lines = input.lines();

        info!("Waiting for events");
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: BusEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable event");
                    continue;
                }
            };
            if !self.covers_event(&event) {
                debug!(topic = %event.topic, "Event is outside the selected repository");
                continue;
            }
            match handler.handle(&event.topic, event.body).await {
                Ok(Some(outcome)) => summary.record_outcome(&outcome),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    error!(topic = %event.topic, error = %e, "Failed to handle event");
                    summary.failed += 1;
                }
            }
        }
        info!("Event stream closed");
        Ok(summary)
    }

    /// Closes duplicate tickets for every upstream issue. Failures are
    /// recorded and the run continues.
    ///
    /// # Errors
    ///
    /// Returns an error if an upstream listing fails.
    pub async fn close_duplicates(&self) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary::new(self.engine.config().testing);
        let config = self.engine.config();

        for (name, repo) in self.repositories(Some(SyncKind::Issue)) {
            let filter = config.github_filter(name);
            for raw in self.source.issues(name, &filter).await? {
                let issue = Issue::with_downstream(Source::Github, name, raw, repo.clone());
                let result = match self.engine.close_duplicates(&issue).await {
                    Ok(count) => ProcessingResult::DuplicatesClosed {
                        url: issue.url().to_string(),
                        count,
                    },
                    Err(e) => {
                        error!(url = %issue.url(), error = %e, "Failed to close duplicates");
                        ProcessingResult::Failed {
                            url: issue.url().to_string(),
                            error: e.to_string(),
                        }
                    }
                };
                summary.record_result(&result);
            }
            summary.repositories_processed += 1;
        }
        Ok(summary)
    }

    /// URLs of every upstream issue under the map.
    ///
    /// # Errors
    ///
    /// Returns an error if an upstream listing fails.
    pub async fn list_managed(&self) -> Result<Vec<String>, RunnerError> {
        let config = self.engine.config();
        let mut urls = Vec::new();
        for (name, _) in self.repositories(None) {
            let filter = config.github_filter(name);
            urls.extend(
                self.source
                    .issues(name, &filter)
                    .await?
                    .into_iter()
                    .map(|raw| raw.url),
            );
        }
        Ok(urls)
    }

    fn covers_event(&self, event: &BusEvent) -> bool {
        if self.config.repo().is_none() {
            return true;
        }
        let repo = event.body.get("repository");
        let owner = repo
            .and_then(|r| r.pointer("/owner/login"))
            .and_then(serde_json::Value::as_str);
        let name = repo
            .and_then(|r| r.get("name"))
            .and_then(serde_json::Value::as_str);
        match (owner, name) {
            (Some(owner), Some(name)) => self.config.includes(&format!("{owner}/{name}")),
            _ => true,
        }
    }

    /// GitHub repositories covered by this run, optionally only those
    /// syncing `kind`.
    fn repositories(&self, kind: Option<SyncKind>) -> Vec<(&str, &RepoConfig)> {
        self.engine
            .config()
            .map
            .github
            .iter()
            .filter(|(name, repo)| {
                self.config.includes(name) && kind.is_none_or(|kind| repo.syncs(kind))
            })
            .map(|(name, repo)| (name.as_str(), repo))
            .collect()
    }

    async fn until_done(&self, kind: SyncKind, summary: &mut RunSummary) -> Result<(), RunnerError> {
        loop {
            let mut batch = RunSummary::new(summary.dry_run);
            match self.batch(kind, &mut batch).await {
                Ok(()) => {
                    summary.absorb(&batch);
                    return Ok(());
                }
                Err(e) if e.is_rate_limit() => {
                    warn!(
                        cooldown_secs = self.config.cooldown().as_secs(),
                        error = %e,
                        "Hit GitHub API limit, sleeping before restarting the batch"
                    );
                    summary.rate_limit_restarts += 1;
                    tokio::time::sleep(self.config.cooldown()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn batch(&self, kind: SyncKind, summary: &mut RunSummary) -> Result<(), RunnerError> {
        for (name, repo) in self.repositories(Some(kind)) {
            let span = info_span!("repository", repo = %name, ?kind);
            async {
                match kind {
                    SyncKind::Issue => self.sync_issues(name, repo, summary).await?,
                    SyncKind::PullRequest => self.sync_pull_requests(name, repo, summary).await?,
                }
                summary.repositories_processed += 1;
                Ok::<(), RunnerError>(())
            }
            .instrument(span)
            .await?;
        }
        Ok(())
    }

    async fn sync_issues(
        &self,
        name: &str,
        repo: &RepoConfig,
        summary: &mut RunSummary,
    ) -> Result<(), RunnerError> {
        let filter = self.engine.config().github_filter(name);
        for mut raw in self.source.issues(name, &filter).await? {
            add_project_values(self.source.as_ref(), name, &mut raw, repo).await?;
            let issue = Issue::with_downstream(Source::Github, name, raw, repo.clone());
            let outcome = self.engine.sync_issue(&issue).await.map_err(|source| {
                error!(url = %issue.url(), error = %source, "Failed on issue");
                RunnerError::Sync {
                    url: issue.url().to_string(),
                    source,
                }
            })?;
            summary.record_result(&ProcessingResult::Success {
                url: issue.url().to_string(),
                outcome,
            });
        }
        Ok(())
    }

    async fn sync_pull_requests(
        &self,
        name: &str,
        repo: &RepoConfig,
        summary: &mut RunSummary,
    ) -> Result<(), RunnerError> {
        let filter = self.engine.config().github_filter(name);
        for raw in self.source.pull_requests(name, &filter).await? {
            let pr = PullRequest::with_downstream(Source::Github, name, raw, repo.clone());
            let outcome = self.engine.sync_pull_request(&pr).await.map_err(|source| {
                error!(url = %pr.url(), error = %source, "Failed on pull request");
                RunnerError::Sync {
                    url: pr.url().to_string(),
                    source,
                }
            })?;
            summary.record_result(&ProcessingResult::Success {
                url: pr.url().to_string(),
                outcome,
            });
        }
        Ok(())
    }
}
