use anyhow::{Context, Result};
use brdata_batch::{convert_to_parquet, ConvertOptions};
use brdata_config::RuntimeConfig;
use brdata_core::catalog::CATALOG;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Incremental ingestion of Brazilian public datasets
#[derive(Parser)]
#[command(name = "brdata")]
#[command(version)]
#[command(about = "Incremental ingestion of Brazilian public datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring one table up to date
    Run {
        /// Dataset id (overrides pipeline.dataset_id)
        #[arg(long)]
        dataset: Option<String>,
        /// Table id (overrides pipeline.table_id)
        #[arg(long)]
        table: Option<String>,
        /// Local output directory (overrides paths.output_dir)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Run even when the stored watermark is current
        #[arg(long)]
        force: bool,
        /// Skip the downstream materialization
        #[arg(long)]
        no_materialize: bool,
    },
    /// Convert a .dbc or .dbf file into Parquet parts
    Convert {
        source: PathBuf,
        dest: PathBuf,
        /// Rows per Parquet part (overrides convert.batch_rows)
        #[arg(long, value_name = "N")]
        batch_rows: Option<usize>,
    },
    /// List the built-in tables
    Tables,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        RuntimeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    match cli.command {
        Commands::Run {
            dataset,
            table,
            output,
            force,
            no_materialize,
        } => {
            if let Some(dataset) = dataset {
                config.pipeline.dataset_id = Some(dataset);
            }
            if let Some(table) = table {
                config.pipeline.table_id = Some(table);
            }
            if let Some(output) = output {
                config.paths.output_dir = output;
            }
            if no_materialize {
                config.pipeline.materialize = false;
            }
            config.validate()?;
            brdata::init_tracing(&config.log);

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to build tokio runtime")?
                .block_on(run(config, force))
        }
        Commands::Convert {
            source,
            dest,
            batch_rows,
        } => {
            brdata::init_tracing(&config.log);
            run_convert(&config, &source, &dest, batch_rows)
        }
        Commands::Tables => {
            for spec in CATALOG.iter() {
                println!(
                    "{}\t{:?}\t{:?}",
                    spec.qualified_name(),
                    spec.format,
                    spec.granularity
                );
            }
            Ok(())
        }
    }
}

async fn run(config: RuntimeConfig, force: bool) -> Result<()> {
    let dataset_id = config.pipeline.dataset_id.clone().context(
        "No dataset given\n\nHow to fix:\n  Pass --dataset, set BRDATA_DATASET_ID or pipeline.dataset_id",
    )?;
    let table_id = config.pipeline.table_id.clone().context(
        "No table given\n\nHow to fix:\n  Pass --table, set BRDATA_TABLE_ID or pipeline.table_id",
    )?;

    let report = brdata::run_table(config, &dataset_id, &table_id, force).await?;
    match report.failure {
        Some(failure) => {
            let hint = failure
                .error
                .hint()
                .map(|hint| format!("\n\nHint: {hint}"))
                .unwrap_or_default();
            anyhow::bail!("{}.{}: {}{}", dataset_id, table_id, failure, hint)
        }
        None => Ok(()),
    }
}

fn run_convert(
    config: &RuntimeConfig,
    source: &Path,
    dest: &Path,
    batch_rows: Option<usize>,
) -> Result<()> {
    let options = ConvertOptions {
        batch_rows: batch_rows.unwrap_or(config.convert.batch_rows),
        temp_dir: None,
    };
    let report = convert_to_parquet(source, dest, &options)
        .with_context(|| format!("Failed to convert {}", source.display()))?;
    tracing::info!(
        source = %source.display(),
        destination = %dest.display(),
        rows = report.rows,
        batches = report.batches,
        "Conversion finished"
    );
    Ok(())
}
