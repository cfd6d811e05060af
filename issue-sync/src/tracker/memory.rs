//! In-memory tracker used by unit tests.

use super::error::TrackerError;
use super::types::{
    DirectoryUser, FieldInfo, FieldUpdate, NewTicket, RemoteLink, Ticket, TicketComment,
    Transition,
};
use super::{Tracker, TrackerConnector, HEALTH_QUERY};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub(crate) struct State {
    pub healthy: bool,
    pub tickets: BTreeMap<String, Ticket>,
    pub comments: BTreeMap<String, Vec<TicketComment>>,
    pub links: BTreeMap<String, Vec<RemoteLink>>,
    pub transitions: Vec<Transition>,
    pub users: Vec<DirectoryUser>,
    pub fields: Vec<FieldInfo>,
    /// Canned results for JQL that is not a remote-link or key query.
    pub searches: BTreeMap<String, Vec<String>>,
    /// Every mutation, in order.
    pub writes: Vec<String>,
    /// Field names whose updates are rejected.
    pub rejected_fields: Vec<String>,
    /// Number of upcoming calls that fail with 401.
    pub unauthorized_calls: usize,
    /// Transition ids that reject a resolution.
    pub no_resolution_transitions: Vec<String>,
    /// Status the health query fails with, if any.
    pub health_status: Option<u16>,
    /// Number of upcoming remote link writes that fail with 500.
    pub failing_links: usize,
    next_id: u64,
}

/// A tracker that keeps everything in memory and records writes.
#[derive(Debug)]
pub(crate) struct MemoryTracker {
    state: Mutex<State>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                healthy: true,
                next_id: 100,
                ..Default::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert_ticket(&self, ticket: Ticket) {
        self.state().tickets.insert(ticket.key.clone(), ticket);
    }

    pub fn link(&self, key: &str, url: &str, title: &str) {
        self.state()
            .links
            .entry(key.to_string())
            .or_default()
            .push(RemoteLink::new(url, title));
    }

    pub fn add_existing_comment(&self, key: &str, author: &str, body: &str, created: &str) {
        let mut state = self.state();
        let id = state.comments.values().map(Vec::len).sum::<usize>() + 1;
        state
            .comments
            .entry(key.to_string())
            .or_default()
            .push(TicketComment {
                id: id.to_string(),
                body: body.to_string(),
                author: author.to_string(),
                created: created.to_string(),
            });
    }

    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    pub fn snapshot(&self, key: &str) -> Ticket {
        self.state().tickets.get(key).cloned().unwrap()
    }

    pub fn comment_bodies(&self, key: &str) -> Vec<String> {
        self.state()
            .comments
            .get(key)
            .map(|c| c.iter().map(|c| c.body.clone()).collect())
            .unwrap_or_default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, State>, TrackerError> {
        let mut state = self.state();
        if state.unauthorized_calls > 0 {
            state.unauthorized_calls -= 1;
            return Err(TrackerError::Unauthorized {
                message: "session expired".to_string(),
            });
        }
        Ok(state)
    }
}

fn not_found(key: &str) -> TrackerError {
    TrackerError::NotFound {
        resource: format!("issue {key}"),
    }
}

/// Returns the URL of the last `linkedIssuesOfRemote("...")` clause.
fn linked_url(jql: &str) -> Option<&str> {
    let start = jql.rfind("linkedIssuesOfRemote(\"")? + "linkedIssuesOfRemote(\"".len();
    let end = jql[start..].find("\")")? + start;
    Some(&jql[start..end])
}

#[async_trait]
impl Tracker for MemoryTracker {
    async fn search(&self, jql: &str) -> Result<Vec<Ticket>, TrackerError> {
        let state = self.guard()?;
        if jql == HEALTH_QUERY {
            if let Some(status) = state.health_status {
                return Err(TrackerError::Http {
                    status,
                    body: "service unavailable".to_string(),
                });
            }
            return Ok(if state.healthy {
                vec![Ticket::default()]
            } else {
                Vec::new()
            });
        }

        if let Some(key) = jql.strip_prefix("key = ") {
            return Ok(state.tickets.get(key.trim()).cloned().into_iter().collect());
        }

        if let Some(url) = linked_url(jql) {
            let unresolved_only = jql.contains("statusCategory != Done");
            return Ok(state
                .tickets
                .values()
                .filter(|t| {
                    state
                        .links
                        .get(&t.key)
                        .is_some_and(|links| links.iter().any(|l| l.url == url))
                })
                .filter(|t| !unresolved_only || t.status_category != "done")
                .cloned()
                .collect());
        }

        Ok(state
            .searches
            .get(jql)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| state.tickets.get(k).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn search_keys(&self, jql: &str, limit: usize) -> Result<Vec<Ticket>, TrackerError> {
        let mut tickets = self.search(jql).await?;
        tickets.truncate(limit);
        Ok(tickets
            .into_iter()
            .map(|t| Ticket {
                id: t.id,
                key: t.key,
                ..Default::default()
            })
            .collect())
    }

    async fn ticket(&self, key: &str) -> Result<Ticket, TrackerError> {
        let state = self.guard()?;
        state.tickets.get(key).cloned().ok_or_else(|| not_found(key))
    }

    async fn create_ticket(&self, new: &NewTicket) -> Result<Ticket, TrackerError> {
        let mut state = self.guard()?;
        state.next_id += 1;
        let id = state.next_id;
        let ticket = Ticket {
            id: id.to_string(),
            key: format!("{}-{id}", new.project),
            summary: new.summary.clone(),
            description: new.description.clone(),
            status: "New".to_string(),
            status_category: "new".to_string(),
            issue_type: new.issue_type.clone(),
            labels: new.labels.clone(),
            fields: new.custom_fields.clone().into_iter().collect(),
            created: "2024-01-01T00:00:00.000+0000".to_string(),
            updated: "2024-01-01T00:00:00.000+0000".to_string(),
            ..Default::default()
        };
        state.writes.push(format!("create {}", ticket.key));
        state.tickets.insert(ticket.key.clone(), ticket.clone());
        Ok(ticket)
    }

    async fn update_field(&self, key: &str, update: &FieldUpdate) -> Result<(), TrackerError> {
        let mut state = self.guard()?;
        if state
            .rejected_fields
            .iter()
            .any(|f| f == update.field_name())
        {
            return Err(TrackerError::Rejected {
                message: format!("{} is not valid", update.field_name()),
            });
        }
        let ticket = state.tickets.get_mut(key).ok_or_else(|| not_found(key))?;
        update.apply_to(ticket);
        state
            .writes
            .push(format!("update {} {key}", update.field_name()));
        Ok(())
    }

    async fn comments(&self, key: &str) -> Result<Vec<TicketComment>, TrackerError> {
        let state = self.guard()?;
        Ok(state.comments.get(key).cloned().unwrap_or_default())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        drop(self.guard()?);
        self.add_existing_comment(key, "sync-bot", body, "2024-01-01T00:00:00.000+0000");
        self.state().writes.push(format!("comment {key}"));
        Ok(())
    }

    async fn edit_comment(&self, key: &str, id: &str, body: &str) -> Result<(), TrackerError> {
        let mut state = self.guard()?;
        let comment = state
            .comments
            .get_mut(key)
            .and_then(|c| c.iter_mut().find(|c| c.id == id))
            .ok_or_else(|| not_found(key))?;
        comment.body = body.to_string();
        state.writes.push(format!("edit comment {id} {key}"));
        Ok(())
    }

    async fn transitions(&self, _key: &str) -> Result<Vec<Transition>, TrackerError> {
        Ok(self.guard()?.transitions.clone())
    }

    async fn transition(
        &self,
        key: &str,
        transition_id: &str,
        resolution: Option<&str>,
    ) -> Result<(), TrackerError> {
        let mut state = self.guard()?;
        if resolution.is_some()
            && state
                .no_resolution_transitions
                .iter()
                .any(|t| t == transition_id)
        {
            return Err(TrackerError::Rejected {
                message: "Field 'resolution' cannot be set".to_string(),
            });
        }
        let name = state
            .transitions
            .iter()
            .find(|t| t.id == transition_id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let ticket = state.tickets.get_mut(key).ok_or_else(|| not_found(key))?;
        ticket.status = name;
        if resolution.is_some() {
            ticket.status_category = "done".to_string();
        }
        state.writes.push(format!("transition {key} {transition_id}"));
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<DirectoryUser>, TrackerError> {
        let state = self.guard()?;
        Ok(state
            .users
            .iter()
            .filter(|u| {
                u.name == query
                    || u.display_name == query
                    || u.email.as_deref().is_some_and(|e| {
                        e.eq_ignore_ascii_case(query)
                            || e.split('@').next() == query.split('@').next()
                    })
            })
            .cloned()
            .collect())
    }

    async fn assign(&self, key: &str, user: Option<&str>) -> Result<(), TrackerError> {
        let mut state = self.guard()?;
        let assignee = user.map(|name| {
            state
                .users
                .iter()
                .find(|u| u.name == name)
                .cloned()
                .unwrap_or_else(|| DirectoryUser {
                    name: name.to_string(),
                    key: name.to_string(),
                    display_name: name.to_string(),
                    email: None,
                })
        });
        let ticket = state.tickets.get_mut(key).ok_or_else(|| not_found(key))?;
        ticket.assignee = assignee;
        state
            .writes
            .push(format!("assign {key} {}", user.unwrap_or("-")));
        Ok(())
    }

    async fn fields(&self) -> Result<Vec<FieldInfo>, TrackerError> {
        Ok(self.guard()?.fields.clone())
    }

    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>, TrackerError> {
        Ok(self.guard()?.links.get(key).cloned().unwrap_or_default())
    }

    async fn add_remote_link(&self, key: &str, link: &RemoteLink) -> Result<(), TrackerError> {
        let mut state = self.guard()?;
        if state.failing_links > 0 {
            state.failing_links -= 1;
            return Err(TrackerError::Http {
                status: 500,
                body: "remote link store unavailable".to_string(),
            });
        }
        state
            .links
            .entry(key.to_string())
            .or_default()
            .push(link.clone());
        state.writes.push(format!("link {key} {}", link.url));
        Ok(())
    }
}

/// Hands out the same [`MemoryTracker`] for every session.
pub(crate) struct MemoryConnector {
    pub tracker: Arc<MemoryTracker>,
    pub connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(tracker: Arc<MemoryTracker>) -> Self {
        Self {
            tracker,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackerConnector for MemoryConnector {
    async fn connect(&self, _instance: &str) -> Result<Arc<dyn Tracker>, TrackerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.tracker.clone() as Arc<dyn Tracker>)
    }
}
