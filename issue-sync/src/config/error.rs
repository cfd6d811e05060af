//! Errors raised while loading the sync configuration.

use super::Source;
use thiserror::Error;

/// Why a configuration file could not be turned into a [`super::SyncConfig`].
///
/// Every variant carries the origin (file path or caller-supplied label) so
/// the operator knows which file to fix.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// The file exists but could not be read.
    #[error("Cannot read configuration '{path}': {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML, or holds an unknown update policy.
    #[error("Malformed configuration '{path}': {source}")]
    Malformed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A top-level setting is out of range or missing.
    #[error("Invalid configuration '{path}': {message}")]
    Invalid { path: String, message: String },

    /// A `[jira.<name>]` entry cannot be used to open a session.
    #[error("Invalid configuration '{path}': jira.{instance}: {message}")]
    InvalidInstance {
        path: String,
        instance: String,
        message: String,
    },

    /// A `[map.<source>."<repo>"]` entry points nowhere usable.
    #[error("Invalid configuration '{path}': map.{source_kind}.\"{repo}\": {message}")]
    InvalidMapping {
        path: String,
        source_kind: Source,
        repo: String,
        message: String,
    },
}

impl ConfigError {
    /// The upstream repository an invalid mapping belongs to, if any.
    #[must_use]
    pub fn repo(&self) -> Option<&str> {
        match self {
            Self::InvalidMapping { repo, .. } => Some(repo),
            _ => None,
        }
    }
}
