//! Run coordinator
//!
//! Drives one dataset/table through
//! `CHECKING -> {SKIPPED | DOWNLOADING -> TRANSFORMING -> PARTITIONING ->
//! UPLOADING -> [MATERIALIZING] -> DONE}`, with `FAILED` reachable from every
//! non-terminal state. The stored watermark only moves on `DONE`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use brdata_batch::{convert_to_parquet, ConvertOptions};
use brdata_config::RuntimeConfig;
use brdata_core::{is_stale, PartitionScheme, TableSpec, Watermark};
use brdata_writer::{PartitionWriter, WriterOptions};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use crate::collaborators::{Collaborators, MaterializationParams, RunStatus};
use crate::error::{PipelineError, Result, StageFailure};
use crate::retry::{Attempt, RetryPolicy};
use crate::state::PipelineState;
use crate::transform::{self, source_file_name, Transformed};

/// What a run did. Returned for every run, failed or not.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub dataset_id: String,
    pub table_id: String,
    pub final_state: PipelineState,
    pub visited: Vec<PipelineState>,
    pub watermark: Option<Watermark>,
    pub records_read: u64,
    pub records_written: u64,
    pub records_dropped: u64,
    pub files_written: Vec<PathBuf>,
    /// Partitions that failed under the isolate policy.
    pub failed_partitions: Vec<String>,
    pub failure: Option<StageFailure>,
}

impl RunReport {
    fn new(spec: &TableSpec) -> Self {
        Self {
            dataset_id: spec.dataset_id.clone(),
            table_id: spec.table_id.clone(),
            final_state: PipelineState::Checking,
            visited: vec![PipelineState::Checking],
            watermark: None,
            records_read: 0,
            records_written: 0,
            records_dropped: 0,
            files_written: Vec::new(),
            failed_partitions: Vec::new(),
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(
            self.final_state,
            PipelineState::Done | PipelineState::Skipped
        )
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.final_state.can_transition_to(next),
            "{} -> {}",
            self.final_state,
            next
        );
        info!(
            dataset_id = %self.dataset_id,
            table_id = %self.table_id,
            state = %next,
            "Pipeline state"
        );
        self.final_state = next;
        self.visited.push(next);
    }
}

pub struct Coordinator {
    spec: TableSpec,
    config: RuntimeConfig,
    collaborators: Collaborators,
    force: bool,
}

impl Coordinator {
    pub fn new(spec: TableSpec, config: RuntimeConfig, collaborators: Collaborators) -> Self {
        Self {
            spec,
            config,
            collaborators,
            force: false,
        }
    }

    /// Skip the freshness gate.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Configured sources win over the catalog's.
    pub fn sources(&self) -> Vec<String> {
        if self.config.pipeline.sources.is_empty() {
            self.spec.sources.clone()
        } else {
            self.config.pipeline.sources.clone()
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.config
            .paths
            .input_dir(&self.spec.dataset_id, &self.spec.table_id)
    }

    pub fn table_output_dir(&self) -> PathBuf {
        self.config.paths.output_dir.join(&self.spec.table_id)
    }

    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new(&self.spec);
        if let Err(error) = self.execute(&mut report).await {
            let stage = report.final_state;
            error!(
                dataset_id = %self.spec.dataset_id,
                table_id = %self.spec.table_id,
                stage = %stage,
                error_type = error.error_type(),
                error = %error,
                "Pipeline run failed"
            );
            report.failure = Some(StageFailure { stage, error });
            report.enter(PipelineState::Failed);
        }
        report
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        let dataset_id = self.spec.dataset_id.as_str();
        let table_id = self.spec.table_id.as_str();

        let remote = self
            .collaborators
            .freshness
            .latest(dataset_id, table_id)
            .await?;
        let local = self.collaborators.watermarks.load(dataset_id, table_id).await?;
        if !self.force && !is_stale(&remote, local.as_ref()) {
            info!(
                dataset_id,
                table_id,
                remote = %remote,
                "Table is up to date"
            );
            report.watermark = local;
            report.enter(PipelineState::Skipped);
            return Ok(());
        }

        report.enter(PipelineState::Downloading);
        let files = self.download().await?;

        report.enter(PipelineState::Transforming);
        if self.spec.format.is_legacy() {
            self.convert_legacy(&files, report).await?;
            // Conversions carry no record-level period; the remote signal stands in.
            report.watermark = Some(remote);
            report.enter(PipelineState::Partitioning);
        } else {
            let transformed = self.transform(files).await?;
            report.records_read = transformed.records_read;
            report.records_dropped = transformed.records_dropped;
            report.watermark = transformed.watermark;

            report.enter(PipelineState::Partitioning);
            self.partition(transformed, report).await?;
        }

        report.enter(PipelineState::Uploading);
        self.collaborators
            .loader
            .upload(
                &self.table_output_dir(),
                dataset_id,
                table_id,
                self.config.pipeline.load_mode,
            )
            .await?;

        if self.config.pipeline.materialize {
            report.enter(PipelineState::Materializing);
            self.materialize().await?;

            // Metadata only moves after a successful materialization.
            if self.config.pipeline.update_metadata {
                if let Some(watermark) = report.watermark {
                    let coverage = local.map_or(watermark, |stored| stored.advance(watermark));
                    self.collaborators
                        .metadata
                        .update(dataset_id, table_id, coverage, self.spec.date_format)
                        .await?;
                }
            }
        }

        match report.watermark {
            Some(watermark) => {
                self.collaborators
                    .watermarks
                    .advance(dataset_id, table_id, watermark)
                    .await?;
            }
            None => warn!(
                dataset_id,
                table_id,
                "No watermark derived; stored watermark left as is"
            ),
        }

        report.enter(PipelineState::Done);
        Ok(())
    }

    /// Fetch every source into a fresh input directory. Any failure fails the
    /// whole stage.
    async fn download(&self) -> Result<Vec<PathBuf>> {
        let sources = self.sources();
        if sources.is_empty() {
            return Err(PipelineError::invalid_argument(format!(
                "no sources configured for {}",
                self.spec.qualified_name()
            )));
        }
        let mut names = HashSet::new();
        for url in &sources {
            if !names.insert(source_file_name(url)) {
                return Err(PipelineError::invalid_argument(format!(
                    "two sources share the file name {}",
                    source_file_name(url)
                )));
            }
        }

        let input_dir = self.input_dir();
        reset_dir(&input_dir).await?;

        let fetcher = &self.collaborators.fetcher;
        let fetched: Vec<(String, bytes::Bytes)> = futures::stream::iter(sources)
            .map(move |url| async move {
                let body = fetcher.fetch(&url).await?;
                debug!(url = %url, bytes = body.len(), "Fetched source");
                Ok::<_, PipelineError>((url, body))
            })
            .buffered(self.config.download.max_concurrent_downloads.max(1))
            .try_collect()
            .await?;

        let mut files = Vec::with_capacity(fetched.len());
        for (url, body) in fetched {
            let path = input_dir.join(source_file_name(&url));
            tokio::fs::write(&path, &body)
                .await
                .map_err(|e| PipelineError::storage(format!("{}: {}", path.display(), e)))?;
            files.push(path);
        }
        info!(files = files.len(), dir = %input_dir.display(), "Sources downloaded");
        Ok(files)
    }

    async fn transform(&self, files: Vec<PathBuf>) -> Result<Transformed> {
        let spec = self.spec.clone();
        let scheme = self.scheme()?;
        tokio::task::spawn_blocking(move || -> Result<Transformed> {
            let mut records = Vec::new();
            for path in &files {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let bytes = std::fs::read(path)
                    .map_err(|e| PipelineError::storage(format!("{}: {}", path.display(), e)))?;
                records.extend(transform::read_records(&spec, &name, &bytes)?);
            }
            Ok(transform::key_records(records, &spec, &scheme))
        })
        .await
        .map_err(|e| PipelineError::decode(self.spec.qualified_name(), e))?
    }

    async fn convert_legacy(&self, files: &[PathBuf], report: &mut RunReport) -> Result<()> {
        let output = self.table_output_dir();
        reset_dir(&output).await?;

        for source in files {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let destination = output.join(&stem);
            let options = ConvertOptions {
                batch_rows: self.config.convert.batch_rows,
                temp_dir: Some(self.config.paths.work_dir.join("tmp")),
            };
            if let Some(temp_dir) = &options.temp_dir {
                tokio::fs::create_dir_all(temp_dir)
                    .await
                    .map_err(PipelineError::storage)?;
            }

            let source_path = source.clone();
            let name = source.display().to_string();
            let converted = tokio::task::spawn_blocking(move || {
                convert_to_parquet(&source_path, &destination, &options)
            })
            .await
            .map_err(|e| PipelineError::decode(name.clone(), e))?
            .map_err(|e| PipelineError::from_convert(name, e))?;

            report.records_read += converted.rows;
            report.records_written += converted.rows;
            report.files_written.extend(converted.parts);
        }
        Ok(())
    }

    async fn partition(&self, transformed: Transformed, report: &mut RunReport) -> Result<()> {
        let options = WriterOptions::new(&self.config.paths.output_dir, &self.spec.table_id)
            .with_partition_config(&self.config.partition)
            .with_column_order(self.spec.column_order.clone());
        let writer = PartitionWriter::new(self.scheme()?, options)?;

        let written = tokio::task::spawn_blocking(move || writer.write(transformed.keyed))
            .await
            .map_err(PipelineError::storage)??;

        report.records_written = written.rows_written() as u64;
        report.files_written = written.files_written;
        report.failed_partitions = written
            .failed
            .iter()
            .map(|(key, reason)| format!("{}: {}", key, reason))
            .collect();
        if !report.failed_partitions.is_empty() {
            warn!(
                failed = report.failed_partitions.len(),
                "Some partitions failed and were skipped"
            );
        }
        Ok(())
    }

    async fn materialize(&self) -> Result<()> {
        let trigger = self.collaborators.materializer.as_ref().ok_or_else(|| {
            PipelineError::invalid_argument("materialization enabled without a trigger")
        })?;
        let params = MaterializationParams {
            mode: self.config.pipeline.materialization_mode,
            dbt_alias: self.config.pipeline.dbt_alias,
        };
        let handle = trigger
            .run_materialization(&self.spec.dataset_id, &self.spec.table_id, params)
            .await?;
        info!(run_id = %handle.0, mode = %params.mode, "Materialization triggered");

        let policy = RetryPolicy::from_config(&self.config.materialization);
        let handle = &handle;
        policy
            .wait_for(move |attempt| async move {
                match trigger.status(handle).await? {
                    RunStatus::Success => Ok(Attempt::Ready(())),
                    RunStatus::Running => {
                        debug!(run_id = %handle.0, attempt, "Materialization running");
                        Ok(Attempt::Pending)
                    }
                    RunStatus::Failed(message) => Err(PipelineError::MaterializationFailed {
                        run_id: handle.0.clone(),
                        message,
                    }),
                }
            })
            .await
    }

    fn scheme(&self) -> Result<PartitionScheme> {
        let years = self.config.partition.years_start..self.config.partition.years_end;
        self.spec
            .scheme()
            .with_years(years)
            .map_err(|e| PipelineError::invalid_argument(e.to_string()))
    }
}

/// Remove `dir` if present and recreate it empty.
async fn reset_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::storage(format!("{}: {}", dir.display(), e))),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::storage(format!("{}: {}", dir.display(), e)))
}
