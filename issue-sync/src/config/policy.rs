//! Field synchronization policies.
//!
//! Each repository opts individual downstream fields into synchronization via
//! an ordered `issue_updates` list. Entries are either bare names
//! (`"comments"`) or single-key tables carrying options
//! (`{ tags = { overwrite = true } }`). They are parsed into [`FieldPolicy`]
//! while the configuration is loaded, so malformed entries never reach the
//! reconciliation engine.

use serde::Deserialize;
use std::collections::BTreeMap;

/// A single opted-in field policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub enum FieldPolicy {
    /// Mirror upstream comments.
    Comments,
    /// Sync upstream tags into downstream labels.
    Tags { overwrite: bool },
    /// Sync upstream milestones into downstream fix versions.
    FixVersion { overwrite: bool },
    /// Sync the upstream assignee.
    Assignee { overwrite: bool },
    /// Keep the downstream description in line with the upstream content.
    Description,
    /// Copy the upstream title.
    Title,
    /// Transition the ticket once upstream closes. `None` only adds the status
    /// banner to the description.
    Transition { target: Option<String> },
    /// Extra labels applied once upstream closes.
    OnClose { apply_labels: Vec<String> },
    /// Sync GitHub project item fields (story points, priority).
    ProjectFields,
    /// Post a provenance comment naming the upstream id on creation.
    UpstreamId,
    /// Append the upstream URL to the description.
    Url,
    /// Convert GitHub-flavoured markdown bodies to tracker markup.
    GithubMarkdown,
}

impl FieldPolicy {
    /// Returns the configuration name of this policy.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::Tags { .. } => "tags",
            Self::FixVersion { .. } => "fixVersion",
            Self::Assignee { .. } => "assignee",
            Self::Description => "description",
            Self::Title => "title",
            Self::Transition { .. } => "transition",
            Self::OnClose { .. } => "on_close",
            Self::ProjectFields => "github_project_fields",
            Self::UpstreamId => "upstream_id",
            Self::Url => "url",
            Self::GithubMarkdown => "github_markdown",
        }
    }
}

/// Policies applied when linking pull requests to an existing ticket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub enum PrPolicy {
    /// Status to move the ticket to once the pull request merges.
    MergeTransition(String),
    /// Status to move the ticket to once a pull request first mentions it.
    LinkTransition(String),
}

/// Untyped policy entry as written in the configuration file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPolicy {
    Name(String),
    Table(BTreeMap<String, toml::Value>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverwriteOption {
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OnCloseOption {
    #[serde(default)]
    apply_labels: Vec<String>,
}

impl TryFrom<RawPolicy> for FieldPolicy {
    type Error = String;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        match raw {
            RawPolicy::Name(name) => match name.as_str() {
                "comments" => Ok(Self::Comments),
                "tags" => Ok(Self::Tags { overwrite: false }),
                "fixVersion" => Ok(Self::FixVersion { overwrite: false }),
                "assignee" => Ok(Self::Assignee { overwrite: false }),
                "description" => Ok(Self::Description),
                "title" => Ok(Self::Title),
                "transition" => Ok(Self::Transition { target: None }),
                "github_project_fields" => Ok(Self::ProjectFields),
                "upstream_id" => Ok(Self::UpstreamId),
                "url" => Ok(Self::Url),
                "github_markdown" => Ok(Self::GithubMarkdown),
                other => Err(format!("unknown issue update policy '{other}'")),
            },
            RawPolicy::Table(table) => {
                let (name, value) = single_entry(table)?;
                match name.as_str() {
                    "tags" => Ok(Self::Tags {
                        overwrite: overwrite_flag(&name, value)?,
                    }),
                    "fixVersion" => Ok(Self::FixVersion {
                        overwrite: overwrite_flag(&name, value)?,
                    }),
                    "assignee" => Ok(Self::Assignee {
                        overwrite: overwrite_flag(&name, value)?,
                    }),
                    "transition" => match value {
                        toml::Value::String(target) if !target.trim().is_empty() => {
                            Ok(Self::Transition {
                                target: Some(target),
                            })
                        }
                        toml::Value::Boolean(true) => Ok(Self::Transition { target: None }),
                        other => Err(format!(
                            "transition expects a status name or `true`, got {other}"
                        )),
                    },
                    "on_close" => {
                        let option: OnCloseOption = value
                            .try_into()
                            .map_err(|e| format!("invalid on_close options: {e}"))?;
                        Ok(Self::OnClose {
                            apply_labels: option.apply_labels,
                        })
                    }
                    other => Err(format!("unknown issue update policy '{other}'")),
                }
            }
        }
    }
}

impl TryFrom<RawPolicy> for PrPolicy {
    type Error = String;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let RawPolicy::Table(table) = raw else {
            return Err("pull request updates must be tables".to_string());
        };
        let (name, value) = single_entry(table)?;
        let toml::Value::String(status) = value else {
            return Err(format!("{name} expects a status name"));
        };
        match name.as_str() {
            "merge_transition" => Ok(Self::MergeTransition(status)),
            "link_transition" => Ok(Self::LinkTransition(status)),
            other => Err(format!("unknown pull request update policy '{other}'")),
        }
    }
}

fn single_entry(table: BTreeMap<String, toml::Value>) -> Result<(String, toml::Value), String> {
    if table.len() != 1 {
        return Err(format!(
            "policy tables must have exactly one key, found {}",
            table.len()
        ));
    }
    table
        .into_iter()
        .next()
        .ok_or_else(|| "empty policy table".to_string())
}

fn overwrite_flag(name: &str, value: toml::Value) -> Result<bool, String> {
    let option: OverwriteOption = value
        .try_into()
        .map_err(|e| format!("invalid {name} options: {e}"))?;
    Ok(option.overwrite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        issue_updates: Vec<FieldPolicy>,
        #[serde(default)]
        pr_updates: Vec<PrPolicy>,
    }

    #[test]
    fn parses_mixed_policy_list() {
        let holder: Holder = toml::from_str(
            r#"
issue_updates = [
  "comments",
  { tags = { overwrite = true } },
  { fixVersion = { overwrite = false } },
  { assignee = {} },
  { transition = "Closed" },
  { transition = true },
  { on_close = { apply_labels = ["closed-upstream"] } },
  "github_project_fields",
  "github_markdown",
]
pr_updates = [{ merge_transition = "Done" }, { link_transition = "In Review" }]
"#,
        )
        .unwrap();

        assert_eq!(
            holder.issue_updates,
            vec![
                FieldPolicy::Comments,
                FieldPolicy::Tags { overwrite: true },
                FieldPolicy::FixVersion { overwrite: false },
                FieldPolicy::Assignee { overwrite: false },
                FieldPolicy::Transition {
                    target: Some("Closed".to_string())
                },
                FieldPolicy::Transition { target: None },
                FieldPolicy::OnClose {
                    apply_labels: vec!["closed-upstream".to_string()]
                },
                FieldPolicy::ProjectFields,
                FieldPolicy::GithubMarkdown,
            ]
        );
        assert_eq!(
            holder.pr_updates,
            vec![
                PrPolicy::MergeTransition("Done".to_string()),
                PrPolicy::LinkTransition("In Review".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_policy_name() {
        let result: Result<Holder, _> = toml::from_str(r#"issue_updates = ["labels"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_multi_key_policy_table() {
        let result: Result<Holder, _> = toml::from_str(
            r#"issue_updates = [{ tags = { overwrite = true }, title = {} }]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_option() {
        let result: Result<Holder, _> =
            toml::from_str(r#"issue_updates = [{ tags = { overwrite = true, merge = 1 } }]"#);
        assert!(result.is_err());
    }
}
