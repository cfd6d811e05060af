//! Values shared by issues and pull requests.

use chrono::{DateTime, Utc};
use std::fmt;

/// An upstream account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamUser {
    /// Account handle, e.g. `octocat`.
    pub login: String,

    /// Display name; falls back to the handle when the profile has none.
    pub fullname: String,
}

impl UpstreamUser {
    /// Creates a user whose display name is known.
    pub fn new(login: impl Into<String>, fullname: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            fullname: fullname.into(),
        }
    }
}

/// Upstream open/closed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpstreamStatus {
    /// Open.
    #[default]
    Open,
    /// Closed.
    Closed,
}

impl UpstreamStatus {
    /// Parses a service state string (`open` / `closed`, any case).
    #[must_use]
    pub fn parse(state: &str) -> Self {
        if state.eq_ignore_ascii_case("closed") {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

impl fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("Open"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// An upstream comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Author handle.
    pub author: String,

    /// Author display name.
    pub name: String,

    /// Comment text.
    pub body: String,

    /// Upstream comment id, stable across edits.
    pub id: String,

    /// Creation timestamp.
    pub date_created: DateTime<Utc>,

    /// Last edit timestamp when the comment was edited upstream.
    pub changed: Option<DateTime<Utc>>,
}
