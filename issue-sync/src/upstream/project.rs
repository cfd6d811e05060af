//! GitHub project board values (priority, story points).

use crate::config::{ProjectFieldConfig, RepoConfig};
use crate::intermediary::UpstreamIssue;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// GraphQL query returning the project cards of one issue.
pub(crate) const PROJECT_ITEMS_QUERY: &str = r"
query ProjectItems($orgname: String!, $reponame: String!, $issuenumber: Int!) {
  repository(owner: $orgname, name: $reponame) {
    issue(number: $issuenumber) {
      projectItems(first: 3) {
        nodes {
          project { title number url }
          fieldValues(first: 100) {
            nodes {
              ... on ProjectV2ItemFieldSingleSelectValue {
                name
                fieldName: field { ... on ProjectV2FieldCommon { name } }
              }
              ... on ProjectV2ItemFieldTextValue {
                text
                fieldName: field { ... on ProjectV2FieldCommon { name } }
              }
              ... on ProjectV2ItemFieldNumberValue {
                number
                fieldName: field { ... on ProjectV2FieldCommon { name } }
              }
            }
          }
        }
      }
    }
  }
}
";

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectItemsResponse {
    #[serde(default)]
    data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    issue: Option<IssueNode>,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    #[serde(rename = "projectItems")]
    project_items: Nodes<ProjectItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl ProjectItemsResponse {
    /// Project cards attached to the issue, or `None` when the issue could
    /// not be resolved.
    pub(crate) fn into_items(self) -> Option<Vec<ProjectItem>> {
        let issue = self.data?.repository?.issue?;
        Some(issue.project_items.nodes.into_iter().flatten().collect())
    }
}

/// One project card of an issue.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectItem {
    /// Board the card is on.
    pub project: ProjectRef,

    #[serde(rename = "fieldValues")]
    field_values: Nodes<FieldValue>,
}

/// Identifies a project board.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRef {
    /// Board title.
    pub title: String,
    /// Board number within the owner.
    pub number: u64,
    /// Board URL.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldValue {
    #[serde(rename = "fieldName", default)]
    field: Option<FieldName>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    number: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldName {
    #[serde(default)]
    name: Option<String>,
}

impl ProjectItem {
    fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.field_values.nodes.iter().flatten().filter_map(|value| {
            let name = value.field.as_ref()?.name.as_deref()?;
            Some((name, value))
        })
    }
}

/// Picks the card on the configured board. Without a configured board, an
/// issue on exactly one board uses that one.
pub(crate) fn select_item(items: &[ProjectItem], project: Option<u64>) -> Option<&ProjectItem> {
    match project {
        Some(number) => {
            let found = items.iter().find(|item| item.project.number == number);
            if found.is_none() {
                debug!(project = number, "Issue is not on the configured project");
            }
            found
        }
        None if items.len() == 1 => items.first(),
        None => {
            if !items.is_empty() {
                let boards: Vec<&str> = items.iter().map(|i| i.project.url.as_str()).collect();
                debug!(?boards, "No project configured and issue is on several boards");
            }
            None
        }
    }
}

/// Copies the mapped board fields onto `raw`.
pub(crate) fn apply_item(
    item: &ProjectItem,
    fields: &BTreeMap<String, ProjectFieldConfig>,
    raw: &mut UpstreamIssue,
) {
    let gh_field = |key: &str| fields.get(key).map(|f| f.gh_field.as_str());
    let priority_field = gh_field("priority");
    let storypoints_field = gh_field("storypoints");

    for (name, value) in item.values() {
        if Some(name) == priority_field {
            raw.priority.clone_from(&value.name);
        } else if Some(name) == storypoints_field {
            match value.number {
                // Whole points only.
                #[allow(clippy::cast_possible_truncation)]
                Some(points) if points.is_finite() => {
                    raw.storypoints = Some((points.trunc() as i64).to_string());
                }
                _ => info!(
                    issue = raw.number,
                    value = ?value.text,
                    "Story points field is not numeric"
                ),
            }
        }
    }
}

/// True if the repository opts into board values.
pub(crate) fn wants_project_values(downstream: &RepoConfig) -> bool {
    downstream.has_policy("github_project_fields") && !downstream.github_project_fields.is_empty()
}
