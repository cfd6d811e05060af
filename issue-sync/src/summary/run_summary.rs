//! Run summary types.

use super::result::ProcessingResult;
use crate::engine::SyncOutcome;

/// Summary of a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Upstream repositories visited.
    pub repositories_processed: usize,

    /// Tickets created.
    pub created: usize,

    /// Existing tickets reconciled.
    pub updated: usize,

    /// Legacy-matched tickets that received a remote link.
    pub upgraded: usize,

    /// Pull requests linked to tickets.
    pub linked: usize,

    /// Entities the workflow skipped.
    pub skipped: usize,

    /// Tickets closed as duplicates.
    pub duplicates_closed: usize,

    /// Entities that failed.
    pub failed: usize,

    /// Times a batch restarted after a rate-limit cooldown.
    pub rate_limit_restarts: usize,

    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl RunSummary {
    /// Creates a new empty summary.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Updates the summary with a processing result.
    pub fn record_result(&mut self, result: &ProcessingResult) {
        match result {
            ProcessingResult::Success { outcome, .. } => self.record_outcome(outcome),
            ProcessingResult::DuplicatesClosed { count, .. } => self.duplicates_closed += count,
            ProcessingResult::Failed { .. } => self.failed += 1,
        }
    }

    /// Counts one workflow outcome.
    pub fn record_outcome(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Created { .. } => self.created += 1,
            SyncOutcome::Updated { .. } => self.updated += 1,
            SyncOutcome::Upgraded { .. } => self.upgraded += 1,
            SyncOutcome::Linked { .. } => self.linked += 1,
            SyncOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Adds the counters of a finished batch.
    pub fn absorb(&mut self, other: &Self) {
        self.repositories_processed += other.repositories_processed;
        self.created += other.created;
        self.updated += other.updated;
        self.upgraded += other.upgraded;
        self.linked += other.linked;
        self.skipped += other.skipped;
        self.duplicates_closed += other.duplicates_closed;
        self.failed += other.failed;
        self.rate_limit_restarts += other.rate_limit_restarts;
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
