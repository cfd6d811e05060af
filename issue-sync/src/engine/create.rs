//! Creating a ticket for an unmatched issue.

use super::{attach_link, SyncEngine, SyncError, SyncOutcome};
use crate::builders;
use crate::intermediary::Issue;
use crate::remote_links::REMOTE_LINK_TITLE;
use crate::tracker::{
    comment_once, transition_to, FieldInfo, FieldUpdate, NewTicket, RemoteLink, Ticket, Tracker,
    TrackerError,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Placeholder in string custom fields replaced by the upstream URL.
const REMOTE_LINK_PLACEHOLDER: &str = "[remote-link]";

fn custom_fields(issue: &Issue) -> BTreeMap<String, Value> {
    issue
        .downstream()
        .custom_fields
        .iter()
        .map(|(field, value)| {
            let value = match value {
                Value::String(text) => Value::String(text.replace(REMOTE_LINK_PLACEHOLDER, issue.url())),
                other => other.clone(),
            };
            (field.clone(), value)
        })
        .collect()
}

fn field_id<'a>(fields: &'a [FieldInfo], name: &str) -> Option<&'a str> {
    fields.iter().find(|f| f.name == name).map(|f| f.id.as_str())
}

impl SyncEngine {
    pub(super) async fn create(
        &self,
        tracker: &dyn Tracker,
        issue: &Issue,
    ) -> Result<SyncOutcome, SyncError> {
        let downstream = issue.downstream();
        let types = builders::preferred_types(issue);
        let new = NewTicket {
            project: downstream.project.clone(),
            summary: issue.title(),
            description: builders::description(issue),
            issue_type: types.first().cloned().unwrap_or_else(|| "Bug".to_string()),
            component: downstream.component.clone(),
            labels: downstream.labels.clone(),
            custom_fields: custom_fields(issue),
        };

        info!(project = %new.project, issue_type = %new.issue_type, "Creating ticket");
        if self.config.testing {
            info!("Testing mode, not creating");
            return Ok(SyncOutcome::skipped("testing"));
        }

        let mut ticket = tracker.create_ticket(&new).await?;
        info!(key = %ticket.key, "Created ticket");
        self.cache.lock().await.insert(issue.url(), ticket.key.clone());
        self.unfinished.lock().await.insert(issue.url().to_string());

        self.finish_creation(tracker, issue, &mut ticket).await?;
        Ok(SyncOutcome::Created { key: ticket.key })
    }

    /// Runs every step that follows ticket creation. Each step checks the
    /// ticket first, so a pass interrupted halfway can run this again.
    pub(super) async fn finish_creation(
        &self,
        tracker: &dyn Tracker,
        issue: &Issue,
        ticket: &mut Ticket,
    ) -> Result<(), SyncError> {
        let downstream = issue.downstream();

        let linked = tracker
            .remote_links(&ticket.key)
            .await?
            .iter()
            .any(|link| link.url == issue.url());
        if !linked {
            attach_link(
                tracker,
                ticket,
                RemoteLink::new(issue.url(), REMOTE_LINK_TITLE),
            )
            .await?;
        }

        if let Some(status) = &downstream.default_status {
            if !ticket.status.eq_ignore_ascii_case(status)
                && transition_to(tracker, &ticket.key, status).await?
            {
                ticket.status.clone_from(status);
            }
        }

        if downstream.has_policy("upstream_id") {
            let body = format!(
                "Creating issue for [{}-#{}|{}]",
                issue.upstream(),
                issue.upstream_id(),
                issue.url()
            );
            comment_once(tracker, &ticket.key, &body).await?;
        }

        let types = builders::preferred_types(issue);
        if types.len() > 1 {
            let body = format!(
                "Some labels look like issue types but were not considered: {:?}",
                &types[1..]
            );
            comment_once(tracker, &ticket.key, &body).await?;
        }

        self.set_named_fields(tracker, issue, ticket).await?;

        self.reconciler(tracker).reconcile(issue, ticket).await?;
        self.unfinished.lock().await.remove(issue.url());
        Ok(())
    }

    /// Fills `epic_link` / `qa_contact` through the tracker's field list.
    async fn set_named_fields(
        &self,
        tracker: &dyn Tracker,
        issue: &Issue,
        ticket: &mut Ticket,
    ) -> Result<(), TrackerError> {
        let downstream = issue.downstream();
        if downstream.epic_link.is_none() && downstream.qa_contact.is_none() {
            return Ok(());
        }
        let fields = tracker.fields().await?;

        let wanted = [
            ("Epic Link", "Epic-Link", &downstream.epic_link),
            ("QA Contact", "QA-Contact", &downstream.qa_contact),
        ];
        for (name, label, value) in wanted {
            let Some(value) = value else {
                continue;
            };
            let Some(field) = field_id(&fields, name) else {
                warn!(key = %ticket.key, field = name, "Tracker has no such field");
                continue;
            };

            let update = FieldUpdate::Custom {
                field: field.to_string(),
                value: Value::String(value.clone()),
            };
            match tracker.update_field(&ticket.key, &update).await {
                Ok(()) => update.apply_to(ticket),
                Err(e) if e.is_session_error() => return Err(e),
                Err(e) => {
                    warn!(key = %ticket.key, field = name, error = %e, "Could not set field");
                    tracker
                        .add_comment(&ticket.key, &format!("Error adding {label}: {value}"))
                        .await?;
                }
            }
        }
        Ok(())
    }
}
