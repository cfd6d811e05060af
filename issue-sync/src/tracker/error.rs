//! Tracker client error types.

use thiserror::Error;

/// Errors returned by a [`Tracker`](super::Tracker).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The session was rejected (HTTP 401). A fresh session may succeed.
    #[error("Tracker session rejected: {message}")]
    Unauthorized { message: String },

    /// The addressed resource does not exist.
    #[error("Tracker resource not found: {resource}")]
    NotFound { resource: String },

    /// The tracker refused a value (HTTP 400), e.g. an unknown fix version.
    #[error("Tracker rejected request: {message}")]
    Rejected { message: String },

    /// Any other non-success response.
    #[error("Tracker request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never completed.
    #[error("Tracker transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body had an unexpected shape.
    #[error("Failed to decode tracker response: {0}")]
    Decode(String),

    /// The client could not be built from its configuration.
    #[error("Invalid tracker configuration: {0}")]
    Configuration(String),
}

impl TrackerError {
    /// Returns true if reconnecting with a fresh session may help.
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns true if the tracker refused the value rather than failing.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
