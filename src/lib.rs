// brdata - incremental ingestion of Brazilian public datasets
//
// Wires the pipeline coordinator to its concrete collaborators: HTTP sources,
// an OpenDAL warehouse, a local JSON state store and an optional HTTP
// materialization service.

pub mod connect;
mod init;
pub mod state_store;

use std::sync::Arc;

use anyhow::{Context, Result};
use brdata_config::RuntimeConfig;
use brdata_core::{catalog, TableSpec};
use brdata_pipeline::{Collaborators, Coordinator, MaterializationTrigger, RunReport};
use tracing::info;

pub use init::init_tracing;
pub use state_store::{JsonStateStore, TableState};

use connect::{HttpFetcher, HttpMaterializer, LastModifiedSignal, OpendalLoader};

/// Look a table up in the built-in catalog.
pub fn table_spec(dataset_id: &str, table_id: &str) -> Result<TableSpec> {
    catalog::lookup(dataset_id, table_id).cloned().with_context(|| {
        format!(
            "Unknown table {}.{}\n\n\
            How to fix:\n  \
            Run `brdata tables` to list the built-in tables.",
            dataset_id, table_id
        )
    })
}

/// Production collaborators for one table.
pub fn build_collaborators(config: &RuntimeConfig, sources: Vec<String>) -> Result<Collaborators> {
    let client = connect::http_client(&config.download)?;
    let operator = brdata_writer::build_operator(&config.storage)
        .context("Failed to initialize warehouse storage")?;
    let state = Arc::new(JsonStateStore::new(&config.paths.state_dir));

    let materializer = if config.pipeline.materialize {
        let endpoint = config
            .materialization
            .endpoint
            .as_deref()
            .context("materialization.endpoint is required when materialize = true")?;
        Some(Arc::new(HttpMaterializer::new(client.clone(), endpoint))
            as Arc<dyn MaterializationTrigger>)
    } else {
        None
    };

    Ok(Collaborators {
        fetcher: Arc::new(HttpFetcher::new(client.clone())),
        loader: Arc::new(OpendalLoader::new(operator)),
        metadata: state.clone(),
        materializer,
        freshness: Arc::new(LastModifiedSignal::new(
            client,
            sources,
            config.freshness.lag_months,
        )),
        watermarks: state,
    })
}

/// Run one table through the pipeline with production collaborators.
pub async fn run_table(
    config: RuntimeConfig,
    dataset_id: &str,
    table_id: &str,
    force: bool,
) -> Result<RunReport> {
    let spec = table_spec(dataset_id, table_id)?;
    let sources = if config.pipeline.sources.is_empty() {
        spec.sources.clone()
    } else {
        config.pipeline.sources.clone()
    };
    let collaborators = build_collaborators(&config, sources)?;
    run_with(spec, config, collaborators, force).await
}

/// Run one table with the given collaborators.
pub async fn run_with(
    spec: TableSpec,
    config: RuntimeConfig,
    collaborators: Collaborators,
    force: bool,
) -> Result<RunReport> {
    init::display_startup_info(&config, &spec.dataset_id, &spec.table_id);

    let report = Coordinator::new(spec, config, collaborators)
        .with_force(force)
        .run()
        .await;

    info!(
        dataset_id = %report.dataset_id,
        table_id = %report.table_id,
        state = %report.final_state,
        records_read = report.records_read,
        records_written = report.records_written,
        records_dropped = report.records_dropped,
        files = report.files_written.len(),
        watermark = ?report.watermark,
        "Run finished"
    );
    Ok(report)
}
