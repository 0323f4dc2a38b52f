//! Concrete collaborators for the pipeline coordinator
//!
//! HTTP sources and the materialization service are reached with reqwest;
//! the warehouse is any OpenDAL operator.

mod fetch;
mod freshness;
mod materialize;
mod warehouse;

use anyhow::{Context, Result};
use brdata_config::DownloadConfig;

pub use fetch::HttpFetcher;
pub use freshness::{period_from_last_modified, LastModifiedSignal};
pub use materialize::{parse_status, HttpMaterializer};
pub use warehouse::OpendalLoader;

const USER_AGENT: &str = concat!("brdata/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for every collaborator of a run.
pub fn http_client(config: &DownloadConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout())
        .build()
        .context("Failed to build HTTP client")
}
