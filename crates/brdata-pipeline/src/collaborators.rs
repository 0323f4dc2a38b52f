//! External systems the coordinator talks to
//!
//! The coordinator only sees these traits; the binary supplies HTTP, object
//! storage and file-backed implementations, tests supply in-memory ones.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use brdata_config::{LoadMode, MaterializationMode};
use brdata_core::{DateFormat, Watermark};
use bytes::Bytes;

use crate::error::Result;

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Full body of `url`. No retries.
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

#[async_trait]
pub trait WarehouseLoader: Send + Sync {
    async fn upload(
        &self,
        local_path: &Path,
        dataset_id: &str,
        table_id: &str,
        mode: LoadMode,
    ) -> Result<()>;
}

#[async_trait]
pub trait MetadataUpdater: Send + Sync {
    async fn update(
        &self,
        dataset_id: &str,
        table_id: &str,
        watermark: Watermark,
        format: DateFormat,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializationParams {
    pub mode: MaterializationMode,
    pub dbt_alias: bool,
}

/// Identifier of a triggered downstream run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Failed(String),
}

#[async_trait]
pub trait MaterializationTrigger: Send + Sync {
    async fn run_materialization(
        &self,
        dataset_id: &str,
        table_id: &str,
        params: MaterializationParams,
    ) -> Result<RunHandle>;

    async fn status(&self, handle: &RunHandle) -> Result<RunStatus>;
}

#[async_trait]
pub trait FreshnessSignal: Send + Sync {
    /// Latest period the remote source holds.
    async fn latest(&self, dataset_id: &str, table_id: &str) -> Result<Watermark>;
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, dataset_id: &str, table_id: &str) -> Result<Option<Watermark>>;

    /// Store `watermark` unless the stored one is newer.
    async fn advance(&self, dataset_id: &str, table_id: &str, watermark: Watermark) -> Result<()>;
}

/// Everything a run needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub loader: Arc<dyn WarehouseLoader>,
    pub metadata: Arc<dyn MetadataUpdater>,
    pub materializer: Option<Arc<dyn MaterializationTrigger>>,
    pub freshness: Arc<dyn FreshnessSignal>,
    pub watermarks: Arc<dyn WatermarkStore>,
}
