//! Upstream adapter error types.

use crate::intermediary::IntermediaryError;
use thiserror::Error;

/// Errors that can occur while fetching or decoding upstream entities.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// GitHub API error.
    #[error("GitHub API error: {0}")]
    GitHubError(#[from] octocrab::Error),

    /// The service refused further requests until its window resets.
    #[error("Upstream rate limit exceeded for {repo}")]
    RateLimitExceeded { repo: String },

    /// An event body could not be decoded.
    #[error("Malformed event payload: {0}")]
    Payload(String),

    /// A repository name was not of the form `owner/name`.
    #[error("Invalid repository name '{0}', expected owner/name")]
    InvalidRepository(String),

    /// The fetched item could not be normalized.
    #[error(transparent)]
    Entity(#[from] IntermediaryError),
}

impl UpstreamError {
    /// Returns true if the error is the service's rate-limit signal.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } => true,
            Self::GitHubError(e) => is_rate_limit_message(&e.to_string()),
            _ => false,
        }
    }
}

pub(crate) fn is_rate_limit_message(message: &str) -> bool {
    message.to_lowercase().contains("rate limit exceeded")
}
