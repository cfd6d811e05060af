//! Source-agnostic upstream entities.
//!
//! Upstream adapters and event handlers turn service payloads into [`Issue`]
//! and [`PullRequest`] values. Construction truncates and scrubs text, applies
//! the repository's fix-version template and binds the entity to its
//! downstream [`RepoConfig`](crate::config::RepoConfig).

mod comment;
mod error;
mod issue;
mod markdown;
mod pull_request;
mod text;

pub use comment::{Comment, UpstreamStatus, UpstreamUser};
pub use error::IntermediaryError;
pub use issue::{Issue, UpstreamIssue};
pub use markdown::gfm_to_jira;
pub use pull_request::{PrSuffix, PullRequest, UpstreamPullRequest};
pub use text::{scrub_content, trim_content, truncate_chars, MAX_CONTENT_CHARS, MAX_TITLE_CHARS};
