//! Field reconciliation.
//!
//! Applies a repository's `issue_updates` policies, in order, to a matched or
//! freshly created ticket. Each policy compares the value it would write with
//! the ticket snapshot and skips the write when they agree, so a second pass
//! over an unchanged issue performs no writes.
//!
//! A failing policy is reported as a comment on the ticket and the remaining
//! policies still run. Session errors are the exception: they abort the pass
//! so the caller can reconnect and retry.

mod assignee;
mod comments;
mod fields;

use crate::builders;
use crate::config::{DefaultJiraFields, FieldPolicy, ProjectFieldConfig};
use crate::identity::IdentityLookup;
use crate::intermediary::{Issue, UpstreamStatus};
use crate::tracker::{comment_once, transition_to, FieldUpdate, Ticket, Tracker, TrackerError};
use assignee::AssigneeResolver;
use comments::CommentAction;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Applies field policies to tickets through one tracker session.
pub struct Reconciler<'a> {
    tracker: &'a dyn Tracker,
    identities: &'a dyn IdentityLookup,
    default_fields: &'a DefaultJiraFields,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler.
    pub fn new(
        tracker: &'a dyn Tracker,
        identities: &'a dyn IdentityLookup,
        default_fields: &'a DefaultJiraFields,
    ) -> Self {
        Self {
            tracker,
            identities,
            default_fields,
        }
    }

    /// Brings `ticket` in line with `issue` for every opted-in field. The
    /// snapshot is updated alongside each write.
    ///
    /// # Errors
    ///
    /// Returns session errors only; every other failure is downgraded to a
    /// comment on the ticket.
    pub async fn reconcile(&self, issue: &Issue, ticket: &mut Ticket) -> Result<(), TrackerError> {
        let span = info_span!("reconcile", key = %ticket.key, url = %issue.url());
        async {
            let policies = &issue.downstream().issue_updates;
            if policies.is_empty() {
                debug!("No field policies configured");
                return Ok(());
            }

            for policy in policies {
                if let Err(e) = self.apply(policy, issue, ticket).await {
                    self.downgrade(policy, ticket, e).await?;
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn apply(
        &self,
        policy: &FieldPolicy,
        issue: &Issue,
        ticket: &mut Ticket,
    ) -> Result<(), TrackerError> {
        match policy {
            FieldPolicy::Comments => self.sync_comments(issue, ticket).await,
            FieldPolicy::Tags { overwrite } => self.sync_tags(issue, ticket, *overwrite).await,
            FieldPolicy::FixVersion { overwrite } => {
                self.sync_fix_version(issue, ticket, *overwrite).await
            }
            FieldPolicy::Assignee { overwrite } => {
                AssigneeResolver::new(self.tracker, self.identities)
                    .sync(issue, ticket, *overwrite)
                    .await
            }
            FieldPolicy::Description => {
                let wanted = builders::description(issue);
                if wanted == ticket.description {
                    return Ok(());
                }
                self.write(ticket, FieldUpdate::Description(wanted)).await
            }
            FieldPolicy::Title => {
                let wanted = issue.title();
                if wanted == ticket.summary {
                    return Ok(());
                }
                self.write(ticket, FieldUpdate::Summary(wanted)).await
            }
            FieldPolicy::Transition { target: Some(target) } => {
                self.sync_transition(issue, ticket, target).await
            }
            FieldPolicy::OnClose { apply_labels } => {
                if issue.status() != UpstreamStatus::Closed || apply_labels.is_empty() {
                    return Ok(());
                }
                let labels = fields::with_labels(&ticket.labels, apply_labels);
                if fields::same_set(&labels, &ticket.labels) {
                    return Ok(());
                }
                self.write(ticket, FieldUpdate::Labels(labels)).await
            }
            FieldPolicy::ProjectFields => self.sync_project_fields(issue, ticket).await,
            // Creation-time and description-only policies.
            FieldPolicy::Transition { target: None }
            | FieldPolicy::UpstreamId
            | FieldPolicy::Url
            | FieldPolicy::GithubMarkdown => Ok(()),
        }
    }

    async fn downgrade(
        &self,
        policy: &FieldPolicy,
        ticket: &Ticket,
        failure: TrackerError,
    ) -> Result<(), TrackerError> {
        if failure.is_session_error() {
            return Err(failure);
        }
        warn!(key = %ticket.key, policy = policy.name(), error = %failure, "Field update failed");

        let body = format!("Error updating {}: {failure}", policy.name());
        match comment_once(self.tracker, &ticket.key, &body).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_session_error() => Err(e),
            Err(e) => {
                error!(key = %ticket.key, error = %e, "Could not report field failure");
                Ok(())
            }
        }
    }

    async fn write(&self, ticket: &mut Ticket, update: FieldUpdate) -> Result<(), TrackerError> {
        self.tracker.update_field(&ticket.key, &update).await?;
        info!(key = %ticket.key, field = update.field_name(), "Updated field");
        update.apply_to(ticket);
        Ok(())
    }

    async fn sync_comments(&self, issue: &Issue, ticket: &Ticket) -> Result<(), TrackerError> {
        let existing = self.tracker.comments(&ticket.key).await?;
        let actions = comments::plan(issue.comments(), &existing);

        for action in &actions {
            match action {
                CommentAction::Add(body) => self.tracker.add_comment(&ticket.key, body).await?,
                CommentAction::Edit { id, body } => {
                    self.tracker.edit_comment(&ticket.key, id, body).await?;
                }
            }
        }
        if !actions.is_empty() {
            info!(key = %ticket.key, count = actions.len(), "Synchronized comments");
        }
        Ok(())
    }

    async fn sync_tags(
        &self,
        issue: &Issue,
        ticket: &mut Ticket,
        overwrite: bool,
    ) -> Result<(), TrackerError> {
        let labels = fields::merged_labels(issue.tags(), &ticket.labels, overwrite);
        if fields::same_set(&labels, &ticket.labels) {
            return Ok(());
        }
        self.write(ticket, FieldUpdate::Labels(labels)).await
    }

    async fn sync_fix_version(
        &self,
        issue: &Issue,
        ticket: &mut Ticket,
        overwrite: bool,
    ) -> Result<(), TrackerError> {
        let versions = fields::merged_fix_versions(issue.fix_version(), &ticket.fix_versions, overwrite);
        if fields::same_set(&versions, &ticket.fix_versions) {
            return Ok(());
        }

        match self.write(ticket, FieldUpdate::FixVersions(versions)).await {
            Err(e) if e.is_rejection() => {
                let wanted: Vec<&str> = issue.fix_version().iter().flatten().map(String::as_str).collect();
                warn!(key = %ticket.key, versions = ?wanted, "Tracker rejected fix version");
                comment_once(
                    self.tracker,
                    &ticket.key,
                    &format!("Error updating fixVersion: {}", wanted.join(", ")),
                )
                .await?;
                Ok(())
            }
            other => other,
        }
    }

    async fn sync_transition(
        &self,
        issue: &Issue,
        ticket: &mut Ticket,
        target: &str,
    ) -> Result<(), TrackerError> {
        if issue.status() != UpstreamStatus::Closed || ticket.status.eq_ignore_ascii_case(target) {
            return Ok(());
        }

        let body = format!(
            "[Upstream issue|{}] closed. Attempting transition to {target}.",
            issue.url()
        );
        comment_once(self.tracker, &ticket.key, &body).await?;
        if transition_to(self.tracker, &ticket.key, target).await? {
            ticket.status = target.to_string();
        }
        Ok(())
    }

    async fn sync_project_fields(&self, issue: &Issue, ticket: &mut Ticket) -> Result<(), TrackerError> {
        for (name, config) in &issue.downstream().github_project_fields {
            match name.as_str() {
                "storypoints" => self.sync_storypoints(issue, ticket).await?,
                "priority" => self.sync_priority(issue, ticket, config).await?,
                other => warn!(field = other, "Unsupported project field"),
            }
        }
        Ok(())
    }

    async fn sync_storypoints(&self, issue: &Issue, ticket: &mut Ticket) -> Result<(), TrackerError> {
        let Some(raw) = issue.storypoints() else {
            return Ok(());
        };
        let Some(field) = self.default_fields.storypoints.clone() else {
            error!("Missing 'storypoints' in default_jira_fields");
            return Ok(());
        };
        let Some(value) = fields::storypoints_value(raw) else {
            return self
                .diagnose(ticket, "storypoints", &format!("'{raw}' is not a number"))
                .await;
        };
        if fields::field_matches(ticket.fields.get(&field), &value) {
            return Ok(());
        }

        match self.write(ticket, FieldUpdate::Custom { field, value }).await {
            Err(e) if !e.is_session_error() => {
                self.diagnose(ticket, "storypoints", &e.to_string()).await
            }
            other => other,
        }
    }

    async fn sync_priority(
        &self,
        issue: &Issue,
        ticket: &mut Ticket,
        config: &ProjectFieldConfig,
    ) -> Result<(), TrackerError> {
        let Some(raw) = issue.priority() else {
            return Ok(());
        };
        let Some(mapped) = config.options.get(raw) else {
            return self
                .diagnose(ticket, "priority", &format!("no tracker priority for '{raw}'"))
                .await;
        };
        let field = self
            .default_fields
            .priority
            .clone()
            .unwrap_or_else(|| "priority".to_string());
        let value = fields::priority_value(mapped);
        if fields::field_matches(ticket.fields.get(&field), &value) {
            return Ok(());
        }

        match self.write(ticket, FieldUpdate::Custom { field, value }).await {
            Err(e) if !e.is_session_error() => self.diagnose(ticket, "priority", &e.to_string()).await,
            other => other,
        }
    }

    async fn diagnose(&self, ticket: &Ticket, field: &str, detail: &str) -> Result<(), TrackerError> {
        warn!(key = %ticket.key, field, detail, "Project field not written");
        comment_once(
            self.tracker,
            &ticket.key,
            &format!("Error updating GitHub project {field} field: {detail}"),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepoConfig, Source};
    use crate::identity::StaticIdentityLookup;
    use crate::intermediary::{Comment, UpstreamIssue, UpstreamUser};
    use crate::tracker::memory::MemoryTracker;
    use crate::tracker::Transition;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn policies() -> Vec<FieldPolicy> {
        vec![
            FieldPolicy::Comments,
            FieldPolicy::Tags { overwrite: false },
            FieldPolicy::FixVersion { overwrite: false },
            FieldPolicy::Assignee { overwrite: true },
            FieldPolicy::Description,
            FieldPolicy::Title,
            FieldPolicy::Transition {
                target: Some("Closed".to_string()),
            },
            FieldPolicy::OnClose {
                apply_labels: vec!["closed-upstream".to_string()],
            },
            FieldPolicy::ProjectFields,
            FieldPolicy::Url,
        ]
    }

    fn repo(policies: Vec<FieldPolicy>) -> RepoConfig {
        RepoConfig {
            project: "FACTORY".to_string(),
            owner: Some("owner".to_string()),
            issue_updates: policies,
            github_project_fields: BTreeMap::from([
                ("storypoints".to_string(), ProjectFieldConfig::default()),
                (
                    "priority".to_string(),
                    ProjectFieldConfig {
                        gh_field: "Priority".to_string(),
                        options: BTreeMap::from([("P0".to_string(), "Blocker".to_string())]),
                    },
                ),
            ]),
            ..Default::default()
        }
    }

    fn raw_issue() -> UpstreamIssue {
        UpstreamIssue {
            title: "Crash on start".to_string(),
            url: "https://github.com/org/repo/issues/1".to_string(),
            body: "It crashes".to_string(),
            comments: vec![Comment {
                author: "octocat".to_string(),
                name: "The Octocat".to_string(),
                body: "Same here".to_string(),
                id: "501".to_string(),
                date_created: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
                changed: None,
            }],
            tags: vec!["bug".to_string(), "needs triage".to_string()],
            milestone: Some("v2".to_string()),
            priority: Some("P0".to_string()),
            storypoints: Some("3".to_string()),
            status: UpstreamStatus::Closed,
            reporter: UpstreamUser::new("octocat", "The Octocat"),
            assignees: vec![UpstreamUser::new("octocat", "The Octocat")],
            id: 9001,
            number: 1,
            ..Default::default()
        }
    }

    fn tracker_with_ticket() -> MemoryTracker {
        let tracker = MemoryTracker::new();
        tracker.insert_ticket(Ticket {
            id: "1".to_string(),
            key: "FACTORY-1".to_string(),
            summary: "old".to_string(),
            status: "New".to_string(),
            labels: vec!["downstream-only".to_string()],
            fix_versions: vec!["v1".to_string()],
            ..Default::default()
        });
        {
            let mut state = tracker.state();
            state.transitions = vec![Transition {
                id: "31".to_string(),
                name: "Closed".to_string(),
            }];
            state.users = vec![crate::tracker::DirectoryUser {
                name: "octo".to_string(),
                key: "octo".to_string(),
                display_name: "The Octocat".to_string(),
                email: Some("octocat@example.com".to_string()),
            }];
        }
        tracker
    }

    fn identities() -> StaticIdentityLookup {
        StaticIdentityLookup::new(BTreeMap::from([(
            "octocat".to_string(),
            vec!["octocat@example.com".to_string()],
        )]))
    }

    fn default_fields() -> DefaultJiraFields {
        DefaultJiraFields {
            storypoints: Some("customfield_1".to_string()),
            priority: None,
        }
    }

    #[tokio::test]
    async fn second_pass_performs_no_writes() {
        let tracker = tracker_with_ticket();
        let lookup = identities();
        let defaults = default_fields();
        let reconciler = Reconciler::new(&tracker, &lookup, &defaults);
        let issue = Issue::with_downstream(Source::Github, "org/repo", raw_issue(), repo(policies()));

        let mut ticket = tracker.snapshot("FACTORY-1");
        reconciler.reconcile(&issue, &mut ticket).await.unwrap();
        let first = tracker.writes();
        assert!(!first.is_empty());

        let mut ticket = tracker.snapshot("FACTORY-1");
        reconciler.reconcile(&issue, &mut ticket).await.unwrap();
        assert_eq!(tracker.writes(), first);

        let stored = tracker.snapshot("FACTORY-1");
        assert_eq!(stored.summary, "[org/repo] Crash on start");
        assert_eq!(stored.status, "Closed");
        assert_eq!(stored.fix_versions, vec!["v1", "v2"]);
        assert_eq!(
            stored.labels,
            vec!["bug", "closed-upstream", "downstream-only", "needs_triage"]
        );
        assert_eq!(stored.assignee.unwrap().name, "octo");
        assert_eq!(stored.fields.get("customfield_1"), Some(&json!(3)));
        assert_eq!(stored.fields.get("priority"), Some(&json!({"name": "Blocker"})));
        assert!(stored.description.ends_with("Upstream URL: https://github.com/org/repo/issues/1"));
    }

    #[tokio::test]
    async fn rejected_fix_version_becomes_comment() {
        let tracker = tracker_with_ticket();
        tracker.state().rejected_fields = vec!["fixVersions".to_string()];
        let lookup = identities();
        let defaults = default_fields();
        let reconciler = Reconciler::new(&tracker, &lookup, &defaults);
        let issue = Issue::with_downstream(
            Source::Github,
            "org/repo",
            raw_issue(),
            repo(vec![
                FieldPolicy::FixVersion { overwrite: false },
                FieldPolicy::Title,
            ]),
        );

        let mut ticket = tracker.snapshot("FACTORY-1");
        reconciler.reconcile(&issue, &mut ticket).await.unwrap();

        assert_eq!(tracker.comment_bodies("FACTORY-1"), vec!["Error updating fixVersion: v2"]);
        assert_eq!(tracker.snapshot("FACTORY-1").fix_versions, vec!["v1"]);
        assert_eq!(tracker.snapshot("FACTORY-1").summary, "[org/repo] Crash on start");
    }

    #[tokio::test]
    async fn unmapped_priority_posts_diagnostic_once() {
        let tracker = tracker_with_ticket();
        let lookup = identities();
        let defaults = default_fields();
        let reconciler = Reconciler::new(&tracker, &lookup, &defaults);
        let raw = UpstreamIssue {
            priority: Some("P9".to_string()),
            storypoints: Some("lots".to_string()),
            ..raw_issue()
        };
        let issue = Issue::with_downstream(
            Source::Github,
            "org/repo",
            raw,
            repo(vec![FieldPolicy::ProjectFields]),
        );

        for _ in 0..2 {
            let mut ticket = tracker.snapshot("FACTORY-1");
            reconciler.reconcile(&issue, &mut ticket).await.unwrap();
        }

        assert_eq!(
            tracker.comment_bodies("FACTORY-1"),
            vec![
                "Error updating GitHub project priority field: no tracker priority for 'P9'",
                "Error updating GitHub project storypoints field: 'lots' is not a number",
            ]
        );
        assert!(tracker.snapshot("FACTORY-1").fields.is_empty());
    }

    #[tokio::test]
    async fn missing_transition_is_not_fatal() {
        let tracker = tracker_with_ticket();
        tracker.state().transitions.clear();
        let lookup = identities();
        let defaults = default_fields();
        let reconciler = Reconciler::new(&tracker, &lookup, &defaults);
        let issue = Issue::with_downstream(
            Source::Github,
            "org/repo",
            raw_issue(),
            repo(vec![FieldPolicy::Transition {
                target: Some("Closed".to_string()),
            }]),
        );

        let mut ticket = tracker.snapshot("FACTORY-1");
        reconciler.reconcile(&issue, &mut ticket).await.unwrap();

        assert_eq!(
            tracker.comment_bodies("FACTORY-1"),
            vec![
                "[Upstream issue|https://github.com/org/repo/issues/1] closed. \
                 Attempting transition to Closed."
            ]
        );
        assert_eq!(tracker.snapshot("FACTORY-1").status, "New");
    }

    #[tokio::test]
    async fn session_errors_propagate() {
        let tracker = tracker_with_ticket();
        tracker.state().unauthorized_calls = 1;
        let lookup = identities();
        let defaults = default_fields();
        let reconciler = Reconciler::new(&tracker, &lookup, &defaults);
        let issue = Issue::with_downstream(
            Source::Github,
            "org/repo",
            raw_issue(),
            repo(vec![FieldPolicy::Comments]),
        );

        let mut ticket = tracker.snapshot("FACTORY-1");
        let result = reconciler.reconcile(&issue, &mut ticket).await;
        assert!(matches!(result, Err(TrackerError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn open_issue_leaves_status_and_labels() {
        let tracker = tracker_with_ticket();
        let lookup = identities();
        let defaults = default_fields();
        let reconciler = Reconciler::new(&tracker, &lookup, &defaults);
        let raw = UpstreamIssue {
            status: UpstreamStatus::Open,
            ..raw_issue()
        };
        let issue = Issue::with_downstream(
            Source::Github,
            "org/repo",
            raw,
            repo(vec![
                FieldPolicy::Transition {
                    target: Some("Closed".to_string()),
                },
                FieldPolicy::OnClose {
                    apply_labels: vec!["closed-upstream".to_string()],
                },
            ]),
        );

        let mut ticket = tracker.snapshot("FACTORY-1");
        reconciler.reconcile(&issue, &mut ticket).await.unwrap();
        assert!(tracker.writes().is_empty());
    }
}
