//! Error types for the synchronization workflow.

use crate::intermediary::IntermediaryError;
use crate::tracker::TrackerError;
use thiserror::Error;

/// Errors that abort synchronization of an entity.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The tracker failed its health probe. Not retried; callers should stop
    /// the run.
    #[error("Tracker instance '{instance}' looks down, refusing to sync")]
    TrackerDown { instance: String },

    /// A tracker call failed, after the single retry when applicable.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The upstream entity could not be bound to a repository mapping.
    #[error(transparent)]
    Entity(#[from] IntermediaryError),

    /// No tracker instance resolves for the entity's repository.
    #[error("No tracker instance configured for {upstream}")]
    NoInstance { upstream: String },
}

impl SyncError {
    /// Returns true if the whole run should stop rather than move on to the
    /// next entity.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TrackerDown { .. })
    }
}
