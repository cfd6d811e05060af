//! Event handling error types.

use crate::engine::SyncError;
use crate::upstream::UpstreamError;
use thiserror::Error;

/// Errors raised while handling one bus event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The body could not be decoded or enriched.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The workflow failed for the event's entity.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl HandlerError {
    /// Returns true if the tracker is down and the listener should stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Sync(e) if e.is_fatal())
    }
}
