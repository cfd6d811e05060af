//! Per-entity results.

use crate::engine::SyncOutcome;

/// Result of processing one upstream entity.
#[derive(Debug, Clone)]
pub enum ProcessingResult {
    /// The workflow finished.
    Success {
        /// Upstream URL.
        url: String,
        /// What the workflow did.
        outcome: SyncOutcome,
    },

    /// Duplicate closing finished.
    DuplicatesClosed {
        /// Upstream URL.
        url: String,
        /// Tickets closed as duplicates.
        count: usize,
    },

    /// Processing failed.
    Failed {
        /// Upstream URL.
        url: String,
        /// Error message.
        error: String,
    },
}

impl ProcessingResult {
    /// Upstream URL the result is for.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::DuplicatesClosed { url, .. } | Self::Failed { url, .. } => {
                url
            }
        }
    }
}
