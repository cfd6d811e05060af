//! Upstream handle -> organizational email lookup.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by an [`IdentityLookup`].
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The directory backing the lookup could not be queried.
    #[error("Identity lookup for '{handle}' failed: {message}")]
    Unavailable { handle: String, message: String },
}

/// Maps an upstream account handle to zero or more email addresses.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Returns the email addresses known for `handle`, preferred first.
    async fn emails(&self, handle: &str) -> Result<Vec<String>, IdentityError>;
}

/// Lookup backed by the `[identities]` configuration table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityLookup {
    table: BTreeMap<String, Vec<String>>,
}

impl StaticIdentityLookup {
    /// Creates a lookup over a handle -> emails table. Handles match
    /// case-insensitively.
    #[must_use]
    pub fn new(table: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            table: table
                .into_iter()
                .map(|(handle, emails)| (handle.to_lowercase(), emails))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityLookup for StaticIdentityLookup {
    async fn emails(&self, handle: &str) -> Result<Vec<String>, IdentityError> {
        Ok(self
            .table
            .get(&handle.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn looks_up_case_insensitively() {
        let lookup = StaticIdentityLookup::new(BTreeMap::from([(
            "OctoCat".to_string(),
            vec!["octocat@example.com".to_string()],
        )]));

        assert_eq!(
            lookup.emails("octocat").await.unwrap(),
            vec!["octocat@example.com".to_string()]
        );
        assert!(lookup.emails("someone").await.unwrap().is_empty());
    }
}
