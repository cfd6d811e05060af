#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

pub mod builders;
pub mod cache;
pub mod config;
pub mod engine;
pub mod handler;
pub mod identity;
pub mod intermediary;
pub mod matching;
pub mod rate_limit;
pub mod reconcile;
pub mod remote_links;
pub mod runner;
pub mod summary;
pub mod tracker;
pub mod upstream;

pub use cache::IdentityCache;
pub use config::{ConfigError, FieldPolicy, RepoConfig, Source, SyncConfig, SyncKind};
pub use engine::{SyncEngine, SyncError, SyncOutcome};
pub use handler::{BusEvent, EventHandler, HandlerError};
pub use identity::{IdentityLookup, StaticIdentityLookup};
pub use intermediary::{Issue, PullRequest};
pub use rate_limit::{check_core_rate_limit, ensure_core_rate_limit, wait_if_needed, RateLimitInfo};
pub use remote_links::{JqlRemoteLinkIndex, RemoteLinkIndex};
pub use runner::{Runner, RunnerConfig, RunnerError};
pub use summary::{ProcessingResult, RunSummary};
pub use tracker::{JiraConnector, Tracker, TrackerConnector, TrackerError};
pub use upstream::{GithubSource, UpstreamError, UpstreamSource};
