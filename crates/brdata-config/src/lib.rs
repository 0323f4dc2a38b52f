// brdata-config - Layered configuration for ingestion runs
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Explicit config file (CLI --config)
// 3. Config file path from BRDATA_CONFIG env var
// 4. Config file contents from BRDATA_CONFIG_CONTENT env var
// 5. Default config file locations (./brdata.toml, ./.brdata.toml)
// 6. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use sources::StdEnvSource;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub convert: ConvertConfig,

    #[serde(default)]
    pub partition: PartitionConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub freshness: FreshnessConfig,

    #[serde(default)]
    pub materialization: MaterializationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Which table to ingest and what to do after loading it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
    /// Overrides the catalog's source URLs when non-empty.
    pub sources: Vec<String>,
    pub load_mode: LoadMode,
    pub materialize: bool,
    pub materialization_mode: MaterializationMode,
    pub dbt_alias: bool,
    pub update_metadata: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_id: None,
            table_id: None,
            sources: Vec::new(),
            load_mode: LoadMode::Overwrite,
            materialize: false,
            materialization_mode: MaterializationMode::Dev,
            dbt_alias: false,
            update_metadata: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    Append,
    #[default]
    Overwrite,
}

impl std::str::FromStr for LoadMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "append" => Ok(LoadMode::Append),
            "overwrite" => Ok(LoadMode::Overwrite),
            _ => anyhow::bail!("Unsupported load mode: {}. Supported: append, overwrite", s),
        }
    }
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Append => write!(f, "append"),
            LoadMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializationMode {
    #[default]
    Dev,
    Prod,
}

impl std::str::FromStr for MaterializationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(MaterializationMode::Dev),
            "prod" => Ok(MaterializationMode::Prod),
            _ => anyhow::bail!("Unsupported materialization mode: {}. Supported: dev, prod", s),
        }
    }
}

impl std::fmt::Display for MaterializationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterializationMode::Dev => write!(f, "dev"),
            MaterializationMode::Prod => write!(f, "prod"),
        }
    }
}

/// Local directories used by a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Downloads land in `<work_dir>/input/<dataset>/<table>`.
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Watermarks and table metadata.
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
            output_dir: PathBuf::from("./output"),
            state_dir: PathBuf::from("./state"),
        }
    }
}

impl PathsConfig {
    pub fn input_dir(&self, dataset_id: &str, table_id: &str) -> PathBuf {
        self.work_dir.join("input").join(dataset_id).join(table_id)
    }
}

/// Legacy binary conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub batch_rows: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            batch_rows: 1_000_000,
        }
    }
}

/// Partitioning writer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// First partitioned year.
    pub years_start: i32,
    /// Exclusive upper bound.
    pub years_end: i32,
    pub failure_policy: FailurePolicy,
    pub max_concurrent_writes: usize,
    pub write_empty_partitions: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            years_start: brdata_core::partition::SUPPORTED_YEARS.start,
            years_end: brdata_core::partition::SUPPORTED_YEARS.end,
            failure_policy: FailurePolicy::Abort,
            max_concurrent_writes: 1,
            write_empty_partitions: true,
        }
    }
}

/// What a failed partition write does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed partition.
    #[default]
    Abort,
    /// Record the failure and keep writing the other partitions.
    Isolate,
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "isolate" => Ok(FailurePolicy::Isolate),
            _ => anyhow::bail!("Unsupported failure policy: {}. Supported: abort, isolate", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_concurrent_downloads: usize,
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
            timeout_secs: 600,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Months between a source's last modification and the latest complete
    /// period it contains.
    pub lag_months: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self { lag_months: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializationConfig {
    pub endpoint: Option<String>,
    pub retry_attempts: u32,
    pub retry_interval_secs: u64,
}

impl Default for MaterializationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            retry_attempts: 10,
            retry_interval_secs: 30,
        }
    }
}

impl MaterializationConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: fs, s3", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./warehouse".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Key prefix under the bucket, without a trailing slash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority.
    ///
    /// `explicit` is the CLI `--config` path; when given it takes the place of
    /// the file lookup chain.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        sources::load_config(explicit, &StdEnvSource)
    }

    /// Load using a custom environment source (tests, embedding).
    pub fn load_with_env<E: EnvSource>(explicit: Option<&Path>, env: &E) -> Result<Self> {
        sources::load_config(explicit, env)
    }

    /// File config replaces whole sections.
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.pipeline = other.pipeline;
        self.paths = other.paths;
        self.convert = other.convert;
        self.partition = other.partition;
        self.download = other.download;
        self.freshness = other.freshness;
        self.materialization = other.materialization;
        self.storage = other.storage;
        self.log = other.log;
    }

    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("fs".parse::<StorageBackend>().unwrap(), StorageBackend::Fs);
        assert_eq!("aws".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert!("r2".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.convert.batch_rows, 1_000_000);
        assert_eq!(config.partition.years_start, 1997);
        assert_eq!(config.partition.years_end, 2024);
        assert_eq!(config.partition.failure_policy, FailurePolicy::Abort);
        assert!(config.partition.write_empty_partitions);
        assert_eq!(config.freshness.lag_months, 1);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.log.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [pipeline]
            dataset_id = "br_me_comex_stat"
            table_id = "municipio_exportacao"
            materialization_mode = "prod"

            [partition]
            failure_policy = "isolate"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.materialization_mode, MaterializationMode::Prod);
        assert_eq!(config.pipeline.load_mode, LoadMode::Overwrite);
        assert_eq!(config.partition.failure_policy, FailurePolicy::Isolate);
        assert_eq!(config.partition.max_concurrent_writes, 1);
        assert_eq!(config.materialization.retry_attempts, 10);
    }

    #[test]
    fn test_input_dir() {
        let paths = PathsConfig::default();
        assert_eq!(
            paths.input_dir("br_me_comex_stat", "ncm_exportacao"),
            PathBuf::from("./work/input/br_me_comex_stat/ncm_exportacao")
        );
    }
}
