// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use brdata_core::partition::SUPPORTED_YEARS;
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_convert_config(&config.convert)?;
    validate_partition_config(&config.partition)?;
    validate_download_config(&config.download)?;
    validate_materialization_config(&config.materialization, &config.pipeline)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_convert_config(config: &ConvertConfig) -> Result<()> {
    if config.batch_rows == 0 {
        bail!(
            "convert.batch_rows must be greater than 0\n\n\
            How to fix:\n\
              • Environment: export {}BATCH_ROWS=1000000\n\
              • TOML: [convert]\n              batch_rows = 1000000\n",
            ENV_PREFIX
        );
    }

    if config.batch_rows > 20_000_000 {
        warn!(
            batch_rows = config.batch_rows,
            "convert.batch_rows is very large; each batch is held in memory"
        );
    }

    Ok(())
}

fn validate_partition_config(config: &PartitionConfig) -> Result<()> {
    if config.years_start >= config.years_end
        || config.years_start < SUPPORTED_YEARS.start
        || config.years_end > SUPPORTED_YEARS.end
    {
        bail!(
            "Partition year range {}..{} is empty or outside {}..{}\n\n\
            How to fix:\n\
              • Environment: export {}YEARS_START=2020 {}YEARS_END=2024\n\
              • TOML: [partition]\n              years_start = 2020\n              years_end = 2024\n",
            config.years_start,
            config.years_end,
            SUPPORTED_YEARS.start,
            SUPPORTED_YEARS.end,
            ENV_PREFIX,
            ENV_PREFIX
        );
    }

    if config.max_concurrent_writes == 0 {
        bail!("partition.max_concurrent_writes must be greater than 0");
    }

    Ok(())
}

fn validate_download_config(config: &DownloadConfig) -> Result<()> {
    if config.max_concurrent_downloads == 0 {
        bail!("download.max_concurrent_downloads must be greater than 0");
    }
    if config.timeout_secs == 0 {
        bail!("download.timeout_secs must be greater than 0");
    }
    Ok(())
}

fn validate_materialization_config(
    config: &MaterializationConfig,
    pipeline: &PipelineConfig,
) -> Result<()> {
    if config.retry_attempts == 0 {
        bail!(
            "materialization.retry_attempts must be greater than 0\n\n\
            How to fix:\n\
              • Environment: export {}RETRY_ATTEMPTS=10\n\
              • TOML: [materialization]\n              retry_attempts = 10\n",
            ENV_PREFIX
        );
    }

    if pipeline.materialize && config.endpoint.as_deref().unwrap_or("").is_empty() {
        bail!(
            "Materialization is enabled but no endpoint is configured\n\n\
            How to fix:\n\
              • Environment: export {}MATERIALIZATION_ENDPOINT=http://localhost:8080\n\
              • TOML: [materialization]\n              endpoint = \"http://localhost:8080\"\n\
              • Or disable it: export {}MATERIALIZE=false\n",
            ENV_PREFIX,
            ENV_PREFIX
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!(
                    "Filesystem path is required\n\n\
                    How to fix:\n\
                      • Environment: export {}STORAGE_PATH=/data/warehouse\n\
                      • TOML: [storage.fs]\n              path = \"/data/warehouse\"\n",
                    ENV_PREFIX
                );
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!(
                    "S3 bucket name is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_BUCKET=my-bucket\n\
                      • TOML: [storage.s3]\n              bucket = \"my-bucket\"\n",
                    ENV_PREFIX
                );
            }

            if s3.region.is_empty() {
                bail!(
                    "S3 region is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_REGION=sa-east-1\n\
                      • TOML: [storage.s3]\n              region = \"sa-east-1\"\n",
                    ENV_PREFIX
                );
            }
        }
    }

    Ok(())
}
