// Initialization utilities for the CLI
//
// Logging/tracing setup and the startup banner

use brdata_config::{LogConfig, LogFormat, RuntimeConfig, StorageBackend};
use tracing::info;

/// Initialize tracing/logging from the `log` section
pub fn init_tracing(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Ignore the error if a subscriber is already set (idempotent)
    let _ = match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

pub(crate) fn display_startup_info(config: &RuntimeConfig, dataset_id: &str, table_id: &str) {
    info!("╭─────────────────────────────────────────────────");
    info!("│ brdata v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Table: {}.{}", dataset_id, table_id);
    info!("│ Load mode: {}", config.pipeline.load_mode);
    info!("│ Work directory: {}", config.paths.work_dir.display());
    info!("│ Output directory: {}", config.paths.output_dir.display());
    info!("│ Storage backend: {}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Fs => {
            if let Some(fs) = &config.storage.fs {
                info!("│ Warehouse path: {}", fs.path);
            }
        }
        StorageBackend::S3 => {
            if let Some(s3) = &config.storage.s3 {
                info!("│ S3 bucket: {}", s3.bucket);
                info!("│ S3 region: {}", s3.region);
            }
        }
    }

    if config.pipeline.materialize {
        info!(
            "│ Materialization: {} ({} attempts, {}s apart)",
            config.pipeline.materialization_mode,
            config.materialization.retry_attempts,
            config.materialization.retry_interval_secs
        );
    } else {
        info!("│ Materialization: disabled");
    }
    info!("╰─────────────────────────────────────────────────");
}
