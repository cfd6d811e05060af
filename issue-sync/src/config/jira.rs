//! Tracker instance configuration.

use serde::Deserialize;

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for one tracker instance.
#[derive(Clone, Deserialize)]
pub struct JiraInstance {
    /// Base URL of the server, e.g. `https://jira.example.com`.
    pub server: String,

    /// Personal access token (bearer auth).
    #[serde(default)]
    pub token: Option<String>,

    /// Username for basic auth.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic auth.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for JiraInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraInstance")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Resolved credentials for a tracker instance.
#[derive(Clone)]
pub enum JiraAuth {
    /// `Authorization: Bearer <token>`.
    Token(String),
    /// HTTP basic auth.
    Basic { username: String, password: String },
}

impl JiraInstance {
    /// Returns the credentials configured for this instance.
    ///
    /// Returns `None` if neither a token nor a username/password pair is set.
    #[must_use]
    pub fn auth(&self) -> Option<JiraAuth> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Some(JiraAuth::Token(token.trim().to_string()));
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(JiraAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}
