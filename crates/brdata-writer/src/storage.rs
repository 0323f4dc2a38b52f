//! Storage operator construction
//!
//! Builds the OpenDAL operator that partitioned output is uploaded to.

use brdata_config::{StorageBackend, StorageConfig};

use crate::error::{Result, WriterError};

/// Build an operator for the configured backend.
pub fn build_operator(config: &StorageConfig) -> Result<opendal::Operator> {
    let operator = match config.backend {
        StorageBackend::Fs => {
            let fs = config.fs.as_ref().ok_or_else(|| {
                WriterError::invalid_config("fs config required for filesystem backend".to_string())
            })?;

            let fs_builder = opendal::services::Fs::default().root(&fs.path);
            opendal::Operator::new(fs_builder)
                .map_err(|e| {
                    WriterError::storage_unavailable(
                        "fs".to_string(),
                        format!("Failed to create filesystem operator: {}", e),
                    )
                })?
                .finish()
        }
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                WriterError::invalid_config("s3 config required for S3 backend".to_string())
            })?;

            let mut s3_builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(prefix) = &s3.prefix {
                s3_builder = s3_builder.root(&format!("/{}", prefix.trim_matches('/')));
            }
            if let Some(endpoint) = &s3.endpoint {
                s3_builder = s3_builder.endpoint(endpoint);
            }

            opendal::Operator::new(s3_builder)
                .map_err(|e| {
                    WriterError::storage_unavailable(
                        "s3".to_string(),
                        format!("Failed to create S3 operator: {}", e),
                    )
                })?
                .finish()
        }
    };

    tracing::debug!(backend = %config.backend, "Storage operator initialized");
    Ok(operator)
}
