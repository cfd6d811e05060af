//! Runner error types.

use crate::engine::SyncError;
use crate::handler::HandlerError;
use crate::upstream::UpstreamError;

/// Errors that abort a batch run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration loading errors.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Upstream fetch errors.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Reading the event stream failed.
    #[error("Failed to read events: {0}")]
    Io(#[from] std::io::Error),

    /// An event left the tracker unusable.
    #[error(transparent)]
    Event(#[from] HandlerError),

    /// An entity failed to synchronize.
    #[error("Failed on {url}: {source}")]
    Sync {
        url: String,
        #[source]
        source: SyncError,
    },
}

impl RunnerError {
    /// Returns true if the error is the upstream rate-limit signal.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Upstream(e) if e.is_rate_limit())
    }
}
