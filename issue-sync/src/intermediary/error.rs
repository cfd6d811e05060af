//! Entity construction errors.

use crate::config::Source;
use thiserror::Error;

/// Errors raised while normalizing an upstream entity.
#[derive(Debug, Error)]
pub enum IntermediaryError {
    /// The upstream repository has no entry under `[map.<service>]`.
    #[error("Repository '{repo}' is not mapped for {service}")]
    UnmappedRepository { service: Source, repo: String },
}
