//! Downstream issue tracker access.
//!
//! The engine only talks to the tracker through [`Tracker`]. Sessions are
//! created by a [`TrackerConnector`]; the workflow asks for a fresh session
//! per entity and again for its single retry, so an expired session never
//! outlives one attempt.

mod error;
mod jira;
#[cfg(test)]
pub(crate) mod memory;
mod types;

pub use error::TrackerError;
pub use jira::{JiraClient, JiraConnector};
pub use types::{
    DirectoryUser, FieldInfo, FieldUpdate, NewTicket, RemoteLink, Ticket, TicketComment,
    Transition,
};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Probe query: any ticket carrying any remote link.
pub const HEALTH_QUERY: &str = "issueFunction in linkedIssuesOfRemote('*')";

/// Operations the engine needs from a tracker session.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Runs a JQL query and returns every matching ticket.
    async fn search(&self, jql: &str) -> Result<Vec<Ticket>, TrackerError>;

    /// Runs a JQL query in a single request and returns at most `limit`
    /// tickets, carrying nothing but their keys.
    async fn search_keys(&self, jql: &str, limit: usize) -> Result<Vec<Ticket>, TrackerError>;

    /// Fetches a ticket by key.
    async fn ticket(&self, key: &str) -> Result<Ticket, TrackerError>;

    /// Creates a ticket and returns its snapshot.
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, TrackerError>;

    /// Writes a single field.
    async fn update_field(&self, key: &str, update: &FieldUpdate) -> Result<(), TrackerError>;

    /// Lists comments, oldest first.
    async fn comments(&self, key: &str) -> Result<Vec<TicketComment>, TrackerError>;

    /// Adds a comment.
    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError>;

    /// Replaces the body of an existing comment.
    async fn edit_comment(&self, key: &str, id: &str, body: &str) -> Result<(), TrackerError>;

    /// Lists the transitions currently legal for a ticket.
    async fn transitions(&self, key: &str) -> Result<Vec<Transition>, TrackerError>;

    /// Applies a transition, optionally setting a resolution.
    async fn transition(
        &self,
        key: &str,
        transition_id: &str,
        resolution: Option<&str>,
    ) -> Result<(), TrackerError>;

    /// Searches the user directory (login, name or email).
    async fn search_users(&self, query: &str) -> Result<Vec<DirectoryUser>, TrackerError>;

    /// Sets the assignee by login name; `None` clears it.
    async fn assign(&self, key: &str, user: Option<&str>) -> Result<(), TrackerError>;

    /// Lists field definitions.
    async fn fields(&self) -> Result<Vec<FieldInfo>, TrackerError>;

    /// Lists remote links.
    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>, TrackerError>;

    /// Attaches a remote link.
    async fn add_remote_link(&self, key: &str, link: &RemoteLink) -> Result<(), TrackerError>;
}

/// Creates tracker sessions for named instances.
#[async_trait]
pub trait TrackerConnector: Send + Sync {
    /// Opens a new session against the named instance.
    async fn connect(&self, instance: &str) -> Result<Arc<dyn Tracker>, TrackerError>;
}

/// Returns true if the tracker answers the health probe with at least one
/// ticket. The probe asks for a single key, however many tickets match.
///
/// # Errors
///
/// Propagates tracker failures.
pub async fn check_health(tracker: &dyn Tracker) -> Result<bool, TrackerError> {
    Ok(!tracker.search_keys(HEALTH_QUERY, 1).await?.is_empty())
}

/// Adds `body` as a comment unless an identical comment already exists.
/// Returns true if a comment was added.
///
/// # Errors
///
/// Propagates tracker failures.
pub async fn comment_once(tracker: &dyn Tracker, key: &str, body: &str) -> Result<bool, TrackerError> {
    if tracker.comments(key).await?.iter().any(|c| c.body == body) {
        return Ok(false);
    }
    tracker.add_comment(key, body).await?;
    Ok(true)
}

/// Moves a ticket through the transition whose name matches `status`
/// (case-insensitive). Returns false if no legal transition matches.
///
/// # Errors
///
/// Propagates tracker failures.
pub async fn transition_to(
    tracker: &dyn Tracker,
    key: &str,
    status: &str,
) -> Result<bool, TrackerError> {
    let transitions = tracker.transitions(key).await?;
    let Some(transition) = transitions
        .iter()
        .find(|t| !t.name.is_empty() && t.name.eq_ignore_ascii_case(status))
    else {
        warn!(key, status, "No legal transition matches target status");
        return Ok(false);
    };

    tracker.transition(key, &transition.id, None).await?;
    info!(key, status, "Transitioned ticket");
    Ok(true)
}
