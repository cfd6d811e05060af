//! Runner configuration.

use crate::rate_limit::COOLDOWN;
use std::time::Duration;

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Only this upstream repository, when set.
    repo: Option<String>,
    /// Sleep after a rate-limit refusal before the batch restarts.
    cooldown: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repo: None,
            cooldown: COOLDOWN,
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration covering every mapped repository.
    #[must_use]
    pub fn new(repo: Option<String>) -> Self {
        Self {
            repo,
            ..Self::default()
        }
    }

    /// Sets a custom rate-limit cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Returns the repository restriction.
    #[must_use]
    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    /// Returns the rate-limit cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns true if `name` is covered by the run.
    #[must_use]
    pub fn includes(&self, name: &str) -> bool {
        self.repo.as_deref().is_none_or(|repo| repo == name)
    }
}
