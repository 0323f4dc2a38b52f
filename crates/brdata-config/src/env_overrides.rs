use super::{
    FailurePolicy, FsConfig, LoadMode, LogFormat, MaterializationMode, RuntimeConfig, S3Config,
    StorageBackend,
};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "BRDATA_";

/// Abstraction over environment-variable lookups so tests can inject values.
pub trait EnvSource {
    /// Look up `BRDATA_<key>`.
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the BRDATA_ prefix
    /// Used for AWS standard variables (AWS_REGION, etc.)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Pipeline selection and flags
    if let Some(dataset) = get_env_string(env, "DATASET_ID")? {
        config.pipeline.dataset_id = Some(dataset);
    }
    if let Some(table) = get_env_string(env, "TABLE_ID")? {
        config.pipeline.table_id = Some(table);
    }
    if let Some(sources) = get_env_string(env, "SOURCES")? {
        config.pipeline.sources = sources
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(mode) = get_env_string(env, "LOAD_MODE")? {
        config.pipeline.load_mode = mode
            .parse::<LoadMode>()
            .context("Invalid BRDATA_LOAD_MODE value")?;
    }
    if let Some(val) = get_env_bool(env, "MATERIALIZE")? {
        config.pipeline.materialize = val;
    }
    if let Some(mode) = get_env_string(env, "MATERIALIZATION_MODE")? {
        config.pipeline.materialization_mode = mode
            .parse::<MaterializationMode>()
            .context("Invalid BRDATA_MATERIALIZATION_MODE value")?;
    }
    if let Some(val) = get_env_bool(env, "DBT_ALIAS")? {
        config.pipeline.dbt_alias = val;
    }
    if let Some(val) = get_env_bool(env, "UPDATE_METADATA")? {
        config.pipeline.update_metadata = val;
    }

    // Paths
    if let Some(dir) = get_env_string(env, "WORK_DIR")? {
        config.paths.work_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get_env_string(env, "OUTPUT_DIR")? {
        config.paths.output_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get_env_string(env, "STATE_DIR")? {
        config.paths.state_dir = PathBuf::from(dir);
    }

    // Conversion and partitioning
    if let Some(val) = get_env_usize(env, "BATCH_ROWS")? {
        config.convert.batch_rows = val;
    }
    if let Some(val) = get_env_i32(env, "YEARS_START")? {
        config.partition.years_start = val;
    }
    if let Some(val) = get_env_i32(env, "YEARS_END")? {
        config.partition.years_end = val;
    }
    if let Some(policy) = get_env_string(env, "FAILURE_POLICY")? {
        config.partition.failure_policy = policy
            .parse::<FailurePolicy>()
            .context("Invalid BRDATA_FAILURE_POLICY value")?;
    }
    if let Some(val) = get_env_usize(env, "MAX_CONCURRENT_WRITES")? {
        config.partition.max_concurrent_writes = val;
    }
    if let Some(val) = get_env_bool(env, "WRITE_EMPTY_PARTITIONS")? {
        config.partition.write_empty_partitions = val;
    }

    // Download
    if let Some(val) = get_env_usize(env, "MAX_CONCURRENT_DOWNLOADS")? {
        config.download.max_concurrent_downloads = val;
    }
    if let Some(val) = get_env_u64(env, "DOWNLOAD_TIMEOUT_SECS")? {
        config.download.timeout_secs = val;
    }

    // Freshness and materialization
    if let Some(val) = get_env_u32(env, "LAG_MONTHS")? {
        config.freshness.lag_months = val;
    }
    if let Some(endpoint) = get_env_string(env, "MATERIALIZATION_ENDPOINT")? {
        config.materialization.endpoint = Some(endpoint);
    }
    if let Some(val) = get_env_u32(env, "RETRY_ATTEMPTS")? {
        config.materialization.retry_attempts = val;
    }
    if let Some(val) = get_env_u64(env, "RETRY_INTERVAL_SECS")? {
        config.materialization.retry_interval_secs = val;
    }

    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND")? {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid BRDATA_STORAGE_BACKEND value")?;
    }
    if let Some(path) = get_env_string(env, "STORAGE_PATH")? {
        config.storage.fs.get_or_insert_with(FsConfig::default).path = path;
    }
    if let Some(bucket) = get_env_string(env, "S3_BUCKET")? {
        ensure_s3(config).bucket = bucket;
    }
    if let Some(region) = get_env_string(env, "S3_REGION")? {
        ensure_s3(config).region = region;
    } else if let Some(region) = env.get_raw("AWS_REGION") {
        if let Some(s3) = config.storage.s3.as_mut() {
            if s3.region.is_empty() {
                s3.region = region;
            }
        }
    }
    if let Some(endpoint) = get_env_string(env, "S3_ENDPOINT")? {
        ensure_s3(config).endpoint = Some(endpoint);
    }
    if let Some(prefix) = get_env_string(env, "S3_PREFIX")? {
        let trimmed = prefix.trim_matches('/').to_string();
        ensure_s3(config).prefix = if trimmed.is_empty() { None } else { Some(trimmed) };
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.log.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn ensure_s3(config: &mut RuntimeConfig) -> &mut S3Config {
    config.storage.s3.get_or_insert_with(|| S3Config {
        bucket: String::new(),
        region: String::new(),
        endpoint: None,
        prefix: None,
    })
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<u32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_i32<E: EnvSource>(env: &E, key: &str) -> Result<Option<i32>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .parse::<i32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
