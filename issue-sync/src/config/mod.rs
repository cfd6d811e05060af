//! Configuration loading.
//!
//! The whole synchronization setup lives in a single TOML file: global
//! switches, tracker instances, and a per-repository map describing where
//! (and how) each upstream repository is mirrored downstream. The file is
//! parsed and validated once at startup; a malformed file aborts the process
//! before any entity is touched.

mod error;
mod jira;
mod policy;
mod repo;

pub use error::ConfigError;
pub use jira::{JiraAuth, JiraInstance};
pub use policy::{FieldPolicy, PrPolicy};
pub use repo::{IssueFilter, ProjectFieldConfig, RepoConfig, Source, SyncKind};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable consulted when `github_token` is not set in the file.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

fn default_cache_size() -> usize {
    1000
}

/// Downstream field ids used for upstream project-board values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultJiraFields {
    /// Field receiving numeric story points.
    #[serde(default)]
    pub storypoints: Option<String>,

    /// Field receiving the mapped priority.
    #[serde(default)]
    pub priority: Option<String>,
}

/// Upstream repositories per source, keyed by `owner/repo` (or GitLab path).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceMap {
    /// GitHub repositories.
    #[serde(default)]
    pub github: BTreeMap<String, RepoConfig>,

    /// GitLab projects.
    #[serde(default)]
    pub gitlab: BTreeMap<String, RepoConfig>,
}

impl SourceMap {
    /// Returns the repositories configured for a source.
    #[must_use]
    pub fn for_source(&self, source: Source) -> &BTreeMap<String, RepoConfig> {
        match source {
            Source::Github => &self.github,
            Source::Gitlab => &self.gitlab,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (Source, &String, &RepoConfig)> {
        self.github
            .iter()
            .map(|(name, repo)| (Source::Github, name, repo))
            .chain(
                self.gitlab
                    .iter()
                    .map(|(name, repo)| (Source::Gitlab, name, repo)),
            )
    }
}

/// Upstream fetch filters per source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterMap {
    /// GitHub repository filters.
    #[serde(default)]
    pub github: BTreeMap<String, IssueFilter>,
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Dry-run: match and log, never write downstream.
    #[serde(default)]
    pub testing: bool,

    /// Skip the tracker health probe.
    #[serde(default)]
    pub develop: bool,

    /// Enable the deprecated `External issue URL` matching path.
    #[serde(default)]
    pub legacy_matching: bool,

    /// Service account the engine writes as. Dedup pointers are only
    /// honoured when authored by this account.
    #[serde(default)]
    pub jira_username: String,

    /// Tracker instance used when a repository names none.
    #[serde(default)]
    pub default_jira_instance: Option<String>,

    /// Capacity of the url -> key cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// GitHub token for upstream reads.
    #[serde(default)]
    pub github_token: Option<String>,

    /// Field ids for project-board values.
    #[serde(default)]
    pub default_jira_fields: DefaultJiraFields,

    /// Tracker instances by name.
    #[serde(default)]
    pub jira: BTreeMap<String, JiraInstance>,

    /// Upstream repository mapping.
    #[serde(default)]
    pub map: SourceMap,

    /// Upstream fetch filters.
    #[serde(default)]
    pub filters: FilterMap,

    /// Static handle -> email table for assignee resolution.
    #[serde(default)]
    pub identities: BTreeMap<String, Vec<String>>,
}

impl SyncConfig {
    /// Loads and validates a configuration file.
    ///
    /// If `github_token` is absent, the `GITHUB_TOKEN` environment variable
    /// is used instead.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, unreadable, not valid
    /// TOML, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content, &path.display().to_string())?;
        debug!(
            github = config.map.github.len(),
            gitlab = config.map.gitlab.len(),
            instances = config.jira.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates configuration text. `origin` names the source in
    /// error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] for bad TOML and one of the
    /// `Invalid*` variants when cross-references do not resolve.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|e| ConfigError::Malformed {
            path: origin.to_string(),
            source: e,
        })?;

        if config.github_token.as_deref().is_none_or(str::is_empty) {
            config.github_token = std::env::var(GITHUB_TOKEN_ENV)
                .ok()
                .filter(|token| !token.trim().is_empty());
        }

        config.validate(origin)?;
        Ok(config)
    }

    /// Checks cross-references that serde cannot express.
    fn validate(&self, origin: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: origin.to_string(),
            message: message.to_string(),
        };
        let bad_instance = |instance: &str, message: String| ConfigError::InvalidInstance {
            path: origin.to_string(),
            instance: instance.to_string(),
            message,
        };
        let bad_mapping = |source: Source, repo: &str, message: String| ConfigError::InvalidMapping {
            path: origin.to_string(),
            source_kind: source,
            repo: repo.to_string(),
            message,
        };

        if self.cache_size == 0 {
            return Err(invalid("cache_size must be greater than zero"));
        }

        if self.jira.is_empty() {
            return Err(invalid("at least one [jira.<name>] instance is required"));
        }

        for (name, instance) in &self.jira {
            url::Url::parse(&instance.server)
                .map_err(|e| bad_instance(name.as_str(), format!("server is not a valid URL: {e}")))?;
            if instance.auth().is_none() {
                return Err(bad_instance(
                    name.as_str(),
                    "needs either `token` or `username` and `password`".to_string(),
                ));
            }
        }

        if let Some(default) = &self.default_jira_instance {
            if !self.jira.contains_key(default) {
                return Err(invalid(&format!(
                    "default_jira_instance '{default}' is not a configured instance"
                )));
            }
        }

        for (source, name, repo) in self.map.iter() {
            if repo.project.trim().is_empty() {
                return Err(bad_mapping(source, name.as_str(), "has an empty project".to_string()));
            }
            if self.instance_name(repo).is_none() {
                let message = match &repo.jira_instance {
                    Some(instance) => format!("jira instance '{instance}' is not configured"),
                    None => "names no jira instance and no default is set".to_string(),
                };
                return Err(bad_mapping(source, name.as_str(), message));
            }
        }

        Ok(())
    }

    /// Returns the downstream configuration for an upstream repository.
    #[must_use]
    pub fn repo(&self, source: Source, name: &str) -> Option<&RepoConfig> {
        self.map.for_source(source).get(name)
    }

    /// Returns the filters for a GitHub repository.
    #[must_use]
    pub fn github_filter(&self, name: &str) -> IssueFilter {
        self.filters.github.get(name).cloned().unwrap_or_default()
    }

    /// Resolves the tracker instance name a repository writes to.
    #[must_use]
    pub fn instance_name<'a>(&'a self, repo: &'a RepoConfig) -> Option<&'a str> {
        let name = repo
            .jira_instance
            .as_deref()
            .or(self.default_jira_instance.as_deref())?;
        self.jira.contains_key(name).then_some(name)
    }

    /// Resolves the tracker instance a repository writes to.
    #[must_use]
    pub fn instance_for(&self, repo: &RepoConfig) -> Option<&JiraInstance> {
        self.instance_name(repo).and_then(|name| self.jira.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
jira_username = "sync-bot"
default_jira_instance = "example"
github_token = "file-token"

[jira.example]
server = "https://jira.example.com"
token = "abc"

[map.github."org/repo"]
project = "FACTORY"
issue_updates = ["comments"]
"#;

    #[test]
    fn can_parse_minimal_config() {
        let config = SyncConfig::from_toml(MINIMAL, "test").unwrap();

        assert_eq!(config.cache_size, 1000);
        assert!(!config.testing);
        let repo = config.repo(Source::Github, "org/repo").unwrap();
        assert_eq!(repo.project, "FACTORY");
        assert_eq!(config.instance_name(repo), Some("example"));
        assert!(config.repo(Source::Gitlab, "org/repo").is_none());
    }

    #[test]
    fn rejects_unknown_default_instance() {
        let content = MINIMAL.replace(
            "default_jira_instance = \"example\"",
            "default_jira_instance = \"missing\"",
        );
        let result = SyncConfig::from_toml(&content, "test");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_zero_cache_size() {
        let content = format!("cache_size = 0\n{MINIMAL}");
        let result = SyncConfig::from_toml(&content, "test");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_repo_without_instance() {
        let content = MINIMAL.replace("default_jira_instance = \"example\"", "");
        let err = SyncConfig::from_toml(&content, "test").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidMapping { source_kind: Source::Github, .. }
        ));
        assert_eq!(err.repo(), Some("org/repo"));
    }

    #[test]
    fn names_the_instance_without_credentials() {
        let content = MINIMAL.replace("token = \"abc\"", "");
        let err = SyncConfig::from_toml(&content, "test").unwrap_err();
        match err {
            ConfigError::InvalidInstance { instance, .. } => assert_eq!(instance, "example"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_malformed_policy() {
        let content = MINIMAL.replace(r#"["comments"]"#, r#"["labels"]"#);
        let result = SyncConfig::from_toml(&content, "test");
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn falls_back_to_env_token() {
        let content = MINIMAL.replace("github_token = \"file-token\"", "");
        temp_env::with_var(GITHUB_TOKEN_ENV, Some("env-token"), || {
            let config = SyncConfig::from_toml(&content, "test").unwrap();
            assert_eq!(config.github_token.as_deref(), Some("env-token"));
        });
    }

    #[test]
    fn file_token_wins_over_env() {
        temp_env::with_var(GITHUB_TOKEN_ENV, Some("env-token"), || {
            let config = SyncConfig::from_toml(MINIMAL, "test").unwrap();
            assert_eq!(config.github_token.as_deref(), Some("file-token"));
        });
    }
}
