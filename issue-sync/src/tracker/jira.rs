//! Jira REST (v2) implementation of [`Tracker`].

use super::error::TrackerError;
use super::types::{
    DirectoryUser, FieldInfo, FieldUpdate, NewTicket, RemoteLink, Ticket, TicketComment,
    Transition,
};
use super::{Tracker, TrackerConnector};
use crate::config::{JiraAuth, JiraInstance};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Page size for paginated endpoints.
const PAGE_SIZE: usize = 50;

/// A session against one Jira server.
#[derive(Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base: String,
    basic: Option<(String, String)>,
}

impl JiraClient {
    /// Builds a client for an instance.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Configuration`] if the instance has no usable
    /// credentials or the HTTP client cannot be built.
    pub fn new(instance: &JiraInstance) -> Result<Self, TrackerError> {
        let auth = instance.auth().ok_or_else(|| {
            TrackerError::Configuration(format!("no credentials for {}", instance.server))
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("issue-sync"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let basic = match auth {
            JiraAuth::Token(token) => {
                let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| {
                        TrackerError::Configuration(format!("invalid authorization header: {e}"))
                    })?;
                headers.insert(reqwest::header::AUTHORIZATION, value);
                None
            }
            JiraAuth::Basic { username, password } => Some((username, password)),
        };

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(instance.timeout_secs.max(1)))
            .build()
            .map_err(|e| TrackerError::Configuration(format!("failed to build client: {e}")))?;

        Ok(Self {
            http,
            base: instance.server.trim_end_matches('/').to_string(),
            basic,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .http
            .request(method, format!("{}/rest/api/2/{path}", self.base));
        match &self.basic {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, TrackerError> {
        debug!(operation, "Sending tracker request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), operation, &body))
    }

    async fn json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, TrackerError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TrackerError::Decode(format!("{operation}: {e}")))
    }
}

/// Maps a non-success response to a [`TrackerError`].
fn classify_failure(status: u16, operation: &str, body: &str) -> TrackerError {
    match status {
        401 => TrackerError::Unauthorized {
            message: format!("{operation}: {}", error_message(body)),
        },
        404 => TrackerError::NotFound {
            resource: operation.to_string(),
        },
        400 => TrackerError::Rejected {
            message: error_message(body),
        },
        _ => TrackerError::Http {
            status,
            body: body.chars().take(800).collect(),
        },
    }
}

/// Extracts Jira's `errorMessages` / `errors` from an error body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase")]
    struct ErrorBody {
        #[serde(default)]
        error_messages: Vec<String>,
        #[serde(default)]
        errors: BTreeMap<String, String>,
    }

    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.chars().take(800).collect();
    };
    let messages: Vec<String> = parsed
        .error_messages
        .into_iter()
        .chain(
            parsed
                .errors
                .into_iter()
                .map(|(field, message)| format!("{field}: {message}")),
        )
        .collect();
    if messages.is_empty() {
        body.chars().take(800).collect()
    } else {
        messages.join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    key: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email_address: Option<String>,
}

impl From<RawUser> for DirectoryUser {
    fn from(raw: RawUser) -> Self {
        Self {
            name: raw.name,
            key: raw.key,
            display_name: raw.display_name,
            email: raw.email_address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status_category: Option<RawStatusCategory>,
}

#[derive(Debug, Deserialize)]
struct RawStatusCategory {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<RawStatus>,
    #[serde(default, rename = "issuetype")]
    issue_type: Option<Named>,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    fix_versions: Option<Vec<Named>>,
    #[serde(default)]
    assignee: Option<RawUser>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    id: String,
    key: String,
    #[serde(default)]
    fields: RawFields,
}

impl From<RawIssue> for Ticket {
    fn from(raw: RawIssue) -> Self {
        let fields = raw.fields;
        let (status, status_category) = fields
            .status
            .map(|s| (s.name, s.status_category.map(|c| c.key).unwrap_or_default()))
            .unwrap_or_default();
        Self {
            id: raw.id,
            key: raw.key,
            summary: fields.summary.unwrap_or_default(),
            description: fields.description.unwrap_or_default(),
            status,
            status_category,
            issue_type: fields.issue_type.map(|t| t.name).unwrap_or_default(),
            labels: fields.labels.unwrap_or_default(),
            fix_versions: fields
                .fix_versions
                .unwrap_or_default()
                .into_iter()
                .map(|v| v.name)
                .collect(),
            assignee: fields.assignee.map(DirectoryUser::from),
            created: fields.created.unwrap_or_default(),
            updated: fields.updated.unwrap_or_default(),
            fields: fields.rest,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    author: Option<RawUser>,
    #[serde(default)]
    created: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
struct TransitionList {
    #[serde(default)]
    transitions: Vec<RawTransition>,
}

#[derive(Debug, Deserialize)]
struct RawTransition {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawField {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawRemoteLink {
    object: RawLinkObject,
}

#[derive(Debug, Deserialize)]
struct RawLinkObject {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    key: String,
}

/// Serializes a field write into the `fields` object of an edit request.
fn update_payload(update: &FieldUpdate) -> Value {
    let (field, value) = match update {
        FieldUpdate::Summary(summary) => ("summary", json!(summary)),
        FieldUpdate::Description(description) => ("description", json!(description)),
        FieldUpdate::Labels(labels) => ("labels", json!(labels)),
        FieldUpdate::FixVersions(versions) => (
            "fixVersions",
            Value::Array(versions.iter().map(|name| json!({ "name": name })).collect()),
        ),
        FieldUpdate::Custom { field, value } => (field.as_str(), value.clone()),
    };
    let mut fields = Map::new();
    fields.insert(field.to_string(), value);
    json!({ "fields": fields })
}

/// Serializes a creation request.
fn create_payload(ticket: &NewTicket) -> Value {
    let mut fields = Map::new();
    for (field, value) in &ticket.custom_fields {
        fields.insert(field.clone(), value.clone());
    }
    fields.insert("project".to_string(), json!({ "key": ticket.project }));
    fields.insert("summary".to_string(), json!(ticket.summary));
    fields.insert("description".to_string(), json!(ticket.description));
    fields.insert("issuetype".to_string(), json!({ "name": ticket.issue_type }));
    if let Some(component) = &ticket.component {
        fields.insert("components".to_string(), json!([{ "name": component }]));
    }
    if !ticket.labels.is_empty() {
        fields.insert("labels".to_string(), json!(ticket.labels));
    }
    json!({ "fields": fields })
}

#[async_trait]
impl Tracker for JiraClient {
    async fn search(&self, jql: &str) -> Result<Vec<Ticket>, TrackerError> {
        let mut tickets = Vec::new();
        loop {
            let start_at = tickets.len().to_string();
            let page_size = PAGE_SIZE.to_string();
            let page: SearchPage = self
                .json(
                    "search",
                    self.request(Method::GET, "search").query(&[
                        ("jql", jql),
                        ("startAt", start_at.as_str()),
                        ("maxResults", page_size.as_str()),
                        ("fields", "*all"),
                    ]),
                )
                .await?;

            let received = page.issues.len();
            tickets.extend(page.issues.into_iter().map(Ticket::from));
            if received == 0 || tickets.len() >= page.total {
                break;
            }
        }
        debug!(jql, count = tickets.len(), "Search complete");
        Ok(tickets)
    }

    async fn search_keys(&self, jql: &str, limit: usize) -> Result<Vec<Ticket>, TrackerError> {
        let limit = limit.to_string();
        let page: SearchPage = self
            .json(
                "search",
                self.request(Method::GET, "search").query(&[
                    ("jql", jql),
                    ("startAt", "0"),
                    ("maxResults", limit.as_str()),
                    ("fields", "key"),
                ]),
            )
            .await?;
        Ok(page.issues.into_iter().map(Ticket::from).collect())
    }

    async fn ticket(&self, key: &str) -> Result<Ticket, TrackerError> {
        let raw: RawIssue = self
            .json(
                &format!("issue {key}"),
                self.request(Method::GET, &format!("issue/{key}")),
            )
            .await?;
        Ok(raw.into())
    }

    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, TrackerError> {
        let created: Created = self
            .json(
                "create issue",
                self.request(Method::POST, "issue").json(&create_payload(ticket)),
            )
            .await?;
        self.ticket(&created.key).await
    }

    async fn update_field(&self, key: &str, update: &FieldUpdate) -> Result<(), TrackerError> {
        self.send(
            &format!("update {} on {key}", update.field_name()),
            self.request(Method::PUT, &format!("issue/{key}"))
                .json(&update_payload(update)),
        )
        .await?;
        Ok(())
    }

    async fn comments(&self, key: &str) -> Result<Vec<TicketComment>, TrackerError> {
        let mut comments = Vec::new();
        loop {
            let start_at = comments.len().to_string();
            let page_size = PAGE_SIZE.to_string();
            let page: CommentPage = self
                .json(
                    &format!("comments of {key}"),
                    self.request(Method::GET, &format!("issue/{key}/comment"))
                        .query(&[
                            ("startAt", start_at.as_str()),
                            ("maxResults", page_size.as_str()),
                        ]),
                )
                .await?;

            let received = page.comments.len();
            comments.extend(page.comments.into_iter().map(|c| TicketComment {
                id: c.id,
                body: c.body,
                author: c.author.map(|a| a.name).unwrap_or_default(),
                created: c.created,
            }));
            if received == 0 || comments.len() >= page.total {
                break;
            }
        }
        Ok(comments)
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        self.send(
            &format!("comment on {key}"),
            self.request(Method::POST, &format!("issue/{key}/comment"))
                .json(&json!({ "body": body })),
        )
        .await?;
        Ok(())
    }

    async fn edit_comment(&self, key: &str, id: &str, body: &str) -> Result<(), TrackerError> {
        self.send(
            &format!("edit comment {id} on {key}"),
            self.request(Method::PUT, &format!("issue/{key}/comment/{id}"))
                .json(&json!({ "body": body })),
        )
        .await?;
        Ok(())
    }

    async fn transitions(&self, key: &str) -> Result<Vec<Transition>, TrackerError> {
        let list: TransitionList = self
            .json(
                &format!("transitions of {key}"),
                self.request(Method::GET, &format!("issue/{key}/transitions")),
            )
            .await?;
        Ok(list
            .transitions
            .into_iter()
            .map(|t| Transition {
                id: t.id,
                name: t.name,
            })
            .collect())
    }

    async fn transition(
        &self,
        key: &str,
        transition_id: &str,
        resolution: Option<&str>,
    ) -> Result<(), TrackerError> {
        let mut payload = json!({ "transition": { "id": transition_id } });
        if let Some(resolution) = resolution {
            payload["fields"] = json!({ "resolution": { "name": resolution } });
        }
        self.send(
            &format!("transition {key}"),
            self.request(Method::POST, &format!("issue/{key}/transitions"))
                .json(&payload),
        )
        .await?;
        Ok(())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<DirectoryUser>, TrackerError> {
        let users: Vec<RawUser> = self
            .json(
                "user search",
                self.request(Method::GET, "user/search")
                    .query(&[("username", query)]),
            )
            .await?;
        Ok(users.into_iter().map(DirectoryUser::from).collect())
    }

    async fn assign(&self, key: &str, user: Option<&str>) -> Result<(), TrackerError> {
        self.send(
            &format!("assign {key}"),
            self.request(Method::PUT, &format!("issue/{key}/assignee"))
                .json(&json!({ "name": user })),
        )
        .await?;
        Ok(())
    }

    async fn fields(&self) -> Result<Vec<FieldInfo>, TrackerError> {
        let fields: Vec<RawField> = self
            .json("field list", self.request(Method::GET, "field"))
            .await?;
        Ok(fields
            .into_iter()
            .map(|f| FieldInfo {
                id: f.id,
                name: f.name,
            })
            .collect())
    }

    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>, TrackerError> {
        let links: Vec<RawRemoteLink> = self
            .json(
                &format!("remote links of {key}"),
                self.request(Method::GET, &format!("issue/{key}/remotelink")),
            )
            .await?;
        Ok(links
            .into_iter()
            .map(|l| RemoteLink::new(l.object.url, l.object.title))
            .collect())
    }

    async fn add_remote_link(&self, key: &str, link: &RemoteLink) -> Result<(), TrackerError> {
        self.send(
            &format!("add remote link to {key}"),
            self.request(Method::POST, &format!("issue/{key}/remotelink"))
                .json(&json!({ "object": { "url": link.url, "title": link.title } })),
        )
        .await?;
        Ok(())
    }
}

/// Opens [`JiraClient`] sessions for the configured instances.
#[derive(Debug, Clone)]
pub struct JiraConnector {
    instances: BTreeMap<String, JiraInstance>,
}

impl JiraConnector {
    /// Creates a connector over the configured instances.
    #[must_use]
    pub fn new(instances: BTreeMap<String, JiraInstance>) -> Self {
        Self { instances }
    }
}

#[async_trait]
impl TrackerConnector for JiraConnector {
    async fn connect(&self, instance: &str) -> Result<Arc<dyn Tracker>, TrackerError> {
        let config = self.instances.get(instance).ok_or_else(|| {
            TrackerError::Configuration(format!("unknown jira instance '{instance}'"))
        })?;
        debug!(instance, server = %config.server, "Opening tracker session");
        Ok(Arc::new(JiraClient::new(config)?))
    }
}
