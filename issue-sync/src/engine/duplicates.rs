//! Closing duplicate tickets linked to the same upstream issue.

use super::{SyncEngine, SyncError};
use crate::intermediary::Issue;
use crate::matching::parse_tracker_timestamp;
use crate::tracker::{comment_once, Ticket, Tracker, TrackerError};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Close transitions tried in order.
const CLOSE_TRANSITIONS: [&str; 5] = ["Dropped", "Reject", "Done", "Closed", "Closed (2)"];

const DUPLICATE_RESOLUTION: &str = "Duplicate";

impl SyncEngine {
    /// Closes every unresolved ticket linked to `issue` except the oldest,
    /// leaving dedup pointers on both sides. Returns the number of duplicates
    /// handled.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TrackerDown`] when the health probe fails, and a
    /// tracker error when both attempts fail.
    pub async fn close_duplicates(&self, issue: &Issue) -> Result<usize, SyncError> {
        let span = info_span!("close_duplicates", url = %issue.url());
        async {
            let instance = self.instance(issue.downstream(), issue.upstream())?;
            let instance = instance.as_str();
            self.with_retry(instance, |tracker| self.duplicates_pass(tracker, issue, instance))
                .await
        }
        .instrument(span)
        .await
    }

    async fn duplicates_pass(
        &self,
        tracker: Arc<dyn Tracker>,
        issue: &Issue,
        instance: &str,
    ) -> Result<usize, SyncError> {
        let tracker = tracker.as_ref();
        self.ensure_healthy(tracker, instance).await?;

        let keys = self.links.linked_tickets(tracker, issue.url(), true).await?;
        if keys.len() <= 1 {
            info!("No duplicates found");
            return Ok(0);
        }

        let mut tickets = Vec::with_capacity(keys.len());
        for key in &keys {
            tickets.push(tracker.ticket(key).await?);
        }
        sort_oldest_first(&mut tickets);

        let (keeper, duplicates) = tickets.split_at(1);
        let keeper = &keeper[0];
        for duplicate in duplicates {
            info!(duplicate = %duplicate.key, keeper = %keeper.key, "Closing duplicate");
            if self.config.testing {
                info!("Testing mode, not closing");
                continue;
            }
            close_as_duplicate(tracker, duplicate, keeper).await?;
        }
        Ok(duplicates.len())
    }
}

/// Oldest first. Unparseable creation dates sort last.
fn sort_oldest_first(tickets: &mut [Ticket]) {
    tickets.sort_by_key(|t| {
        let created = parse_tracker_timestamp(&t.created);
        (created.is_none(), created)
    });
}

async fn close_as_duplicate(
    tracker: &dyn Tracker,
    duplicate: &Ticket,
    keeper: &Ticket,
) -> Result<(), TrackerError> {
    comment_once(
        tracker,
        &duplicate.key,
        &format!("Marking as duplicate of {}", keeper.key),
    )
    .await?;
    comment_once(
        tracker,
        &keeper.key,
        &format!("{} is a duplicate.", duplicate.key),
    )
    .await?;

    let transitions = tracker.transitions(&duplicate.key).await?;
    let Some(close) = CLOSE_TRANSITIONS
        .iter()
        .find_map(|name| transitions.iter().find(|t| t.name == *name))
    else {
        warn!(key = %duplicate.key, "No close transition available");
        return Ok(());
    };

    match tracker
        .transition(&duplicate.key, &close.id, Some(DUPLICATE_RESOLUTION))
        .await
    {
        Err(e) if e.is_rejection() => {
            warn!(key = %duplicate.key, error = %e, "Closing without a resolution");
            tracker.transition(&duplicate.key, &close.id, None).await
        }
        other => other,
    }
}
