//! Downstream ticket snapshot and request types.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A user from the tracker's directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryUser {
    /// Login name, used for assignment.
    pub name: String,
    /// Directory key, used in `[~key]` mentions.
    pub key: String,
    /// Display name.
    pub display_name: String,
    /// Primary email address.
    pub email: Option<String>,
}

/// Snapshot of a downstream ticket.
///
/// Reconciliation keeps this snapshot in step with the writes it performs so
/// later policies compare against the value the tracker now holds.
#[derive(Debug, Clone, Default)]
pub struct Ticket {
    /// Numeric id.
    pub id: String,
    /// Key, e.g. `FACTORY-12`.
    pub key: String,
    /// Summary line.
    pub summary: String,
    /// Description, empty when unset.
    pub description: String,
    /// Workflow status name.
    pub status: String,
    /// Status category key (`new`, `indeterminate`, `done`).
    pub status_category: String,
    /// Issue type name.
    pub issue_type: String,
    /// Labels.
    pub labels: Vec<String>,
    /// Fix version names.
    pub fix_versions: Vec<String>,
    /// Current assignee.
    pub assignee: Option<DirectoryUser>,
    /// Creation timestamp as returned by the tracker.
    pub created: String,
    /// Last update timestamp as returned by the tracker.
    pub updated: String,
    /// Remaining raw fields, keyed by field id.
    pub fields: Map<String, Value>,
}

/// A comment on a downstream ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketComment {
    /// Comment id.
    pub id: String,
    /// Body text.
    pub body: String,
    /// Author login name.
    pub author: String,
    /// Creation timestamp as returned by the tracker.
    pub created: String,
}

/// A workflow transition currently legal for a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Transition id.
    pub id: String,
    /// Transition name, usually the target status.
    pub name: String,
}

/// A remote link attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLink {
    /// Linked URL.
    pub url: String,
    /// Link title.
    pub title: String,
}

impl RemoteLink {
    /// Creates a remote link.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// A field definition from the tracker's field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field id, e.g. `customfield_12311140`.
    pub id: String,
    /// Human readable name, e.g. `Epic Link`.
    pub name: String,
}

/// A single field write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the summary.
    Summary(String),
    /// Replace the description.
    Description(String),
    /// Replace the label set.
    Labels(Vec<String>),
    /// Replace the fix versions.
    FixVersions(Vec<String>),
    /// Set a raw field to a JSON value.
    Custom { field: String, value: Value },
}

impl FieldUpdate {
    /// Short name for logs.
    #[must_use]
    pub fn field_name(&self) -> &str {
        match self {
            Self::Summary(_) => "summary",
            Self::Description(_) => "description",
            Self::Labels(_) => "labels",
            Self::FixVersions(_) => "fixVersions",
            Self::Custom { field, .. } => field,
        }
    }

    /// Applies the write to a local snapshot.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        match self {
            Self::Summary(summary) => ticket.summary.clone_from(summary),
            Self::Description(description) => ticket.description.clone_from(description),
            Self::Labels(labels) => ticket.labels.clone_from(labels),
            Self::FixVersions(versions) => ticket.fix_versions.clone_from(versions),
            Self::Custom { field, value } => {
                ticket.fields.insert(field.clone(), value.clone());
            }
        }
    }
}

/// Payload for creating a ticket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTicket {
    /// Project key.
    pub project: String,
    /// Summary line.
    pub summary: String,
    /// Description.
    pub description: String,
    /// Issue type name.
    pub issue_type: String,
    /// Component name.
    pub component: Option<String>,
    /// Labels.
    pub labels: Vec<String>,
    /// Raw custom fields.
    pub custom_fields: BTreeMap<String, Value>,
}
