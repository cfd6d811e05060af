//! GitHub rate limit handling.
//!
//! Listing checks the core budget before each page and sleeps through the
//! reset when it runs low. If GitHub still refuses a request, the runner
//! sleeps [`COOLDOWN`] and restarts its batch.

use octocrab::Octocrab;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Longest proactive wait for a window reset.
const MAX_WAIT_SECS: u64 = 3600;

/// Remaining requests below which we wait for the reset.
const MIN_REMAINING_THRESHOLD: u32 = 5;

/// Sleep after a hard rate-limit refusal before the batch restarts.
pub const COOLDOWN: Duration = Duration::from_secs(3600);

/// Core API budget.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// Unix timestamp when the window resets.
    pub reset: u64,
    /// Requests allowed per window.
    pub limit: u32,
}

impl RateLimitInfo {
    /// Seconds until the window resets, capped at an hour. Zero when the
    /// budget is healthy or the reset has passed.
    #[must_use]
    pub fn wait_secs(&self, now: u64) -> u64 {
        if self.remaining >= MIN_REMAINING_THRESHOLD || self.reset <= now {
            return 0;
        }
        let wait = self.reset - now;
        if wait > MAX_WAIT_SECS {
            warn!(
                wait_secs = wait,
                max_wait = MAX_WAIT_SECS,
                "Rate limit reset too far in future, capping wait time"
            );
        }
        wait.min(MAX_WAIT_SECS)
    }
}

/// Reads the core API budget.
///
/// # Errors
///
/// Returns an error if the rate limit API call fails.
pub async fn check_core_rate_limit(octocrab: &Octocrab) -> Result<RateLimitInfo, octocrab::Error> {
    let rate_limit = octocrab.ratelimit().get().await?;
    let core = &rate_limit.resources.core;

    Ok(RateLimitInfo {
        remaining: u32::try_from(core.remaining).unwrap_or(u32::MAX),
        reset: core.reset,
        limit: u32::try_from(core.limit).unwrap_or(u32::MAX),
    })
}

/// Sleeps until the window resets if the budget is nearly spent. Returns
/// true if it slept.
pub async fn wait_if_needed(info: &RateLimitInfo) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let wait_secs = info.wait_secs(now);
    if wait_secs == 0 {
        return false;
    }

    info!(
        remaining = info.remaining,
        limit = info.limit,
        wait_secs,
        "Rate limit low, waiting for reset"
    );
    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
    true
}

/// Checks the core budget and waits if needed.
///
/// # Errors
///
/// Returns an error if the rate limit check fails.
pub async fn ensure_core_rate_limit(octocrab: &Octocrab) -> Result<(), octocrab::Error> {
    let info = check_core_rate_limit(octocrab).await?;
    wait_if_needed(&info).await;
    Ok(())
}
