// Coordinator runs against in-memory collaborators

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use brdata_batch::dbc::build_dbc;
use brdata_batch::dbf::build_dbf;
use brdata_config::{LoadMode, MaterializationMode, RuntimeConfig};
use brdata_core::rename::IDENTITY;
use brdata_core::{
    DateFormat, Granularity, SourceFormat, TableSpec, TextEncoding, Watermark, WatermarkSource,
};
use brdata_pipeline::{
    Collaborators, Coordinator, FreshnessSignal, MaterializationParams, MaterializationTrigger,
    MetadataUpdater, PipelineError, PipelineState, Result, RunHandle, RunStatus, SourceFetcher,
    WarehouseLoader, WatermarkStore,
};
use bytes::Bytes;
use parking_lot::Mutex;

const SOURCE_URL: &str = "http://source.test/municipio.csv";
const DBC_URL: &str = "http://source.test/PASP2001.dbc";

struct StaticFetcher {
    bodies: HashMap<String, Bytes>,
    calls: AtomicUsize,
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::network(url, "404 Not Found"))
    }
}

#[derive(Default)]
struct RecordingLoader {
    uploads: Mutex<Vec<(PathBuf, LoadMode)>>,
    fail: bool,
}

#[async_trait]
impl WarehouseLoader for RecordingLoader {
    async fn upload(
        &self,
        local_path: &Path,
        _dataset_id: &str,
        _table_id: &str,
        mode: LoadMode,
    ) -> Result<()> {
        self.uploads.lock().push((local_path.to_path_buf(), mode));
        if self.fail {
            return Err(PipelineError::storage("bucket unreachable"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMetadata {
    updates: Mutex<Vec<String>>,
}

#[async_trait]
impl MetadataUpdater for RecordingMetadata {
    async fn update(
        &self,
        _dataset_id: &str,
        _table_id: &str,
        watermark: Watermark,
        format: DateFormat,
    ) -> Result<()> {
        self.updates.lock().push(watermark.format(format));
        Ok(())
    }
}

/// Reports `Running` for the first `running_polls` polls, then `final_status`.
struct ScriptedTrigger {
    triggered: AtomicUsize,
    polls: AtomicUsize,
    running_polls: usize,
    final_status: RunStatus,
    params: Mutex<Option<MaterializationParams>>,
}

impl ScriptedTrigger {
    fn new(running_polls: usize, final_status: RunStatus) -> Self {
        Self {
            triggered: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            running_polls,
            final_status,
            params: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MaterializationTrigger for ScriptedTrigger {
    async fn run_materialization(
        &self,
        _dataset_id: &str,
        _table_id: &str,
        params: MaterializationParams,
    ) -> Result<RunHandle> {
        self.triggered.fetch_add(1, Ordering::SeqCst);
        *self.params.lock() = Some(params);
        Ok(RunHandle("run-1".to_string()))
    }

    async fn status(&self, _handle: &RunHandle) -> Result<RunStatus> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll < self.running_polls {
            Ok(RunStatus::Running)
        } else {
            Ok(self.final_status.clone())
        }
    }
}

struct FixedSignal(Watermark);

#[async_trait]
impl FreshnessSignal for FixedSignal {
    async fn latest(&self, _dataset_id: &str, _table_id: &str) -> Result<Watermark> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct MemoryWatermarks(Mutex<Option<Watermark>>);

#[async_trait]
impl WatermarkStore for MemoryWatermarks {
    async fn load(&self, _dataset_id: &str, _table_id: &str) -> Result<Option<Watermark>> {
        Ok(*self.0.lock())
    }

    async fn advance(&self, _dataset_id: &str, _table_id: &str, watermark: Watermark) -> Result<()> {
        let mut stored = self.0.lock();
        *stored = Some(stored.map_or(watermark, |current| current.advance(watermark)));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    config: RuntimeConfig,
    fetcher: Arc<StaticFetcher>,
    loader: Arc<RecordingLoader>,
    metadata: Arc<RecordingMetadata>,
    trigger: Arc<ScriptedTrigger>,
    watermarks: Arc<MemoryWatermarks>,
    remote: Watermark,
}

impl Harness {
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.paths.work_dir = dir.path().join("work");
        config.paths.output_dir = dir.path().join("output");
        config.paths.state_dir = dir.path().join("state");
        config.partition.years_start = 2020;
        config.partition.years_end = 2021;
        config.materialization.retry_interval_secs = 0;

        let mut bodies = HashMap::new();
        bodies.insert(SOURCE_URL.to_string(), Bytes::from(body.to_string()));

        Self {
            _dir: dir,
            config,
            fetcher: Arc::new(StaticFetcher {
                bodies,
                calls: AtomicUsize::new(0),
            }),
            loader: Arc::new(RecordingLoader::default()),
            metadata: Arc::new(RecordingMetadata::default()),
            trigger: Arc::new(ScriptedTrigger::new(0, RunStatus::Success)),
            watermarks: Arc::new(MemoryWatermarks::default()),
            remote: Watermark::from_year_month(2020, 3).unwrap(),
        }
    }

    fn spec() -> TableSpec {
        TableSpec {
            dataset_id: "br_me_comex_stat".to_string(),
            table_id: "municipio_exportacao".to_string(),
            sources: vec![SOURCE_URL.to_string()],
            format: SourceFormat::Csv,
            delimiter: b',',
            encoding: TextEncoding::Utf8,
            rename: IDENTITY,
            granularity: Granularity::MonthState,
            column_order: Vec::new(),
            watermark: WatermarkSource::YearMonth,
            date_format: DateFormat::YearMonth,
        }
    }

    fn coordinator(&self) -> Coordinator {
        self.coordinator_with(Self::spec())
    }

    fn coordinator_with(&self, spec: TableSpec) -> Coordinator {
        let collaborators = Collaborators {
            fetcher: self.fetcher.clone(),
            loader: self.loader.clone(),
            metadata: self.metadata.clone(),
            materializer: Some(self.trigger.clone() as Arc<dyn MaterializationTrigger>),
            freshness: Arc::new(FixedSignal(self.remote)),
            watermarks: self.watermarks.clone(),
        };
        Coordinator::new(spec, self.config.clone(), collaborators)
    }

    fn output(&self, relative: &str) -> PathBuf {
        self.config.paths.output_dir.join(relative)
    }
}

const SP_ROWS: &str = "ano,mes,sigla_uf,id_municipio,valor\n\
2020,3,SP,3400000,10\n\
2020,3,SP,3600000,20\n\
1990,1,SP,3600000,30\n";

#[tokio::test]
async fn not_stale_run_is_skipped_without_io() {
    let harness = Harness::new(SP_ROWS);
    *harness.watermarks.0.lock() = Some(harness.remote);

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Skipped);
    assert_eq!(
        report.visited,
        vec![PipelineState::Checking, PipelineState::Skipped]
    );
    assert!(report.succeeded());
    assert_eq!(harness.fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(harness.loader.uploads.lock().is_empty());
    assert_eq!(harness.trigger.triggered.load(Ordering::SeqCst), 0);
    assert!(!harness.config.paths.output_dir.exists());
}

#[tokio::test]
async fn sp_records_are_corrected_and_partitioned() {
    let harness = Harness::new(SP_ROWS);

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Done, "{:?}", report.failure);
    assert_eq!(
        report.visited,
        vec![
            PipelineState::Checking,
            PipelineState::Downloading,
            PipelineState::Transforming,
            PipelineState::Partitioning,
            PipelineState::Uploading,
            PipelineState::Done,
        ]
    );
    assert_eq!(report.records_read, 3);
    assert_eq!(report.records_dropped, 1);
    assert_eq!(report.records_written, 2);

    let csv = std::fs::read_to_string(harness.output(
        "municipio_exportacao/ano=2020/mes=3/sigla_uf=SP/municipio_exportacao.csv",
    ))
    .unwrap();
    assert_eq!(csv, "id_municipio,valor\n3500000,10\n3600000,20\n");

    // Every expected partition exists, populated or not.
    assert!(harness
        .output("municipio_exportacao/ano=2020/mes=12/sigla_uf=AC")
        .is_dir());

    let uploads = harness.loader.uploads.lock();
    assert_eq!(
        uploads.as_slice(),
        &[(harness.output("municipio_exportacao"), LoadMode::Overwrite)]
    );
    assert_eq!(
        *harness.watermarks.0.lock(),
        Watermark::from_year_month(2020, 3)
    );
    assert_eq!(report.watermark, Watermark::from_year_month(2020, 3));
}

#[tokio::test]
async fn force_bypasses_freshness_gate() {
    let harness = Harness::new(SP_ROWS);
    *harness.watermarks.0.lock() = Some(harness.remote);

    let report = harness.coordinator().with_force(true).run().await;
    assert_eq!(report.final_state, PipelineState::Done);
    assert_eq!(harness.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_failure_fails_download_stage() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.pipeline.sources = vec![
        SOURCE_URL.to_string(),
        "http://source.test/missing.csv".to_string(),
    ];

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Failed);
    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, PipelineState::Downloading);
    assert_eq!(failure.error_type(), "NetworkError");
    assert!(harness.loader.uploads.lock().is_empty());
    assert_eq!(*harness.watermarks.0.lock(), None);
}

#[tokio::test]
async fn upload_failure_leaves_watermark_unchanged() {
    let mut harness = Harness::new(SP_ROWS);
    harness.loader = Arc::new(RecordingLoader {
        uploads: Mutex::new(Vec::new()),
        fail: true,
    });
    let previous = Watermark::from_year_month(2019, 12).unwrap();
    *harness.watermarks.0.lock() = Some(previous);

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Failed);
    assert_eq!(report.failure.unwrap().stage, PipelineState::Uploading);
    assert_eq!(*harness.watermarks.0.lock(), Some(previous));
}

#[tokio::test]
async fn materialization_wait_uses_exact_attempt_budget() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.pipeline.materialize = true;
    harness.config.materialization.retry_attempts = 3;
    harness.trigger = Arc::new(ScriptedTrigger::new(usize::MAX, RunStatus::Success));

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Failed);
    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, PipelineState::Materializing);
    assert_eq!(failure.error_type(), "MaterializationTimeout");
    assert_eq!(harness.trigger.triggered.load(Ordering::SeqCst), 1);
    assert_eq!(harness.trigger.polls.load(Ordering::SeqCst), 3);
    assert_eq!(*harness.watermarks.0.lock(), None);
    assert!(harness.metadata.updates.lock().is_empty());
}

#[tokio::test]
async fn failed_materialization_is_not_retried() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.pipeline.materialize = true;
    harness.trigger = Arc::new(ScriptedTrigger::new(
        1,
        RunStatus::Failed("model error".to_string()),
    ));

    let report = harness.coordinator().run().await;

    assert_eq!(report.failure.unwrap().error_type(), "MaterializationFailed");
    assert_eq!(harness.trigger.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn materialized_run_updates_metadata_then_watermark() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.pipeline.materialize = true;
    harness.config.pipeline.update_metadata = true;
    harness.config.pipeline.materialization_mode = MaterializationMode::Prod;
    harness.config.pipeline.dbt_alias = true;
    harness.trigger = Arc::new(ScriptedTrigger::new(2, RunStatus::Success));

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Done);
    assert_eq!(report.visited[report.visited.len() - 2], PipelineState::Materializing);
    assert_eq!(
        *harness.trigger.params.lock(),
        Some(MaterializationParams {
            mode: MaterializationMode::Prod,
            dbt_alias: true,
        })
    );
    assert_eq!(harness.metadata.updates.lock().as_slice(), &["2020-03".to_string()]);
    assert_eq!(
        *harness.watermarks.0.lock(),
        Watermark::from_year_month(2020, 3)
    );
}

#[tokio::test]
async fn metadata_is_left_alone_without_materialization() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.pipeline.materialize = false;
    harness.config.pipeline.update_metadata = true;

    let report = harness.coordinator().run().await;

    assert_eq!(report.final_state, PipelineState::Done);
    assert_eq!(harness.trigger.triggered.load(Ordering::SeqCst), 0);
    assert!(harness.metadata.updates.lock().is_empty());
    assert_eq!(
        *harness.watermarks.0.lock(),
        Watermark::from_year_month(2020, 3)
    );
}

#[tokio::test]
async fn forced_rerun_of_older_data_keeps_metadata_coverage() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.pipeline.materialize = true;
    harness.config.pipeline.update_metadata = true;
    let stored = Watermark::from_year_month(2021, 1).unwrap();
    *harness.watermarks.0.lock() = Some(stored);

    let report = harness.coordinator().with_force(true).run().await;

    assert_eq!(report.final_state, PipelineState::Done);
    assert_eq!(report.watermark, Watermark::from_year_month(2020, 3));
    assert_eq!(harness.metadata.updates.lock().as_slice(), &["2021-01".to_string()]);
    assert_eq!(*harness.watermarks.0.lock(), Some(stored));
}

#[tokio::test]
async fn rerun_redownloads_into_clean_input_dir() {
    let harness = Harness::new(SP_ROWS);
    let coordinator = harness.coordinator().with_force(true);

    let stray = coordinator.input_dir().join("stale.csv");
    std::fs::create_dir_all(coordinator.input_dir()).unwrap();
    std::fs::write(&stray, "x").unwrap();

    let report = coordinator.run().await;
    assert_eq!(report.final_state, PipelineState::Done);
    assert!(!stray.exists());
    assert!(coordinator.input_dir().join("municipio.csv").exists());
}

fn legacy_spec() -> TableSpec {
    TableSpec {
        dataset_id: "br_ms_sia".to_string(),
        table_id: "producao_ambulatorial".to_string(),
        sources: vec![DBC_URL.to_string()],
        format: SourceFormat::Dbc,
        delimiter: b',',
        encoding: TextEncoding::Latin1,
        rename: IDENTITY,
        granularity: Granularity::Month,
        column_order: Vec::new(),
        watermark: WatermarkSource::YearMonth,
        date_format: DateFormat::YearMonth,
    }
}

#[tokio::test]
async fn dbc_source_is_converted_to_parquet_parts() {
    let mut harness = Harness::new(SP_ROWS);
    harness.config.convert.batch_rows = 2;
    let rows: Vec<(Vec<&str>, bool)> = ["SP", "RJ", "MG"]
        .iter()
        .map(|uf| (vec![*uf], false))
        .collect();
    let dbc = build_dbc(&build_dbf(&[("UF", 2)], &rows));
    harness.fetcher = Arc::new(StaticFetcher {
        bodies: HashMap::from([(DBC_URL.to_string(), Bytes::from(dbc))]),
        calls: AtomicUsize::new(0),
    });

    let coordinator = harness.coordinator_with(legacy_spec());
    let leftover = coordinator.table_output_dir().join("OLD2000/part-00000.parquet");
    std::fs::create_dir_all(leftover.parent().unwrap()).unwrap();
    std::fs::write(&leftover, "x").unwrap();

    let report = coordinator.run().await;

    assert_eq!(report.final_state, PipelineState::Done, "{:?}", report.failure);
    assert_eq!(
        report.visited,
        vec![
            PipelineState::Checking,
            PipelineState::Downloading,
            PipelineState::Transforming,
            PipelineState::Partitioning,
            PipelineState::Uploading,
            PipelineState::Done,
        ]
    );
    // No record-level period: the remote signal becomes the watermark.
    assert_eq!(report.watermark, Some(harness.remote));
    assert_eq!(*harness.watermarks.0.lock(), Some(harness.remote));
    assert_eq!(report.records_read, 3);

    let parts = harness.output("producao_ambulatorial/PASP2001");
    assert_eq!(
        report.files_written,
        vec![parts.join("part-00000.parquet"), parts.join("part-00001.parquet")]
    );
    assert!(report.files_written.iter().all(|part| part.exists()));
    assert!(!leftover.exists());

    let scratch = harness.config.paths.work_dir.join("tmp");
    assert_eq!(std::fs::read_dir(scratch).unwrap().count(), 0);

    let uploads = harness.loader.uploads.lock();
    assert_eq!(
        uploads.as_slice(),
        &[(coordinator.table_output_dir(), LoadMode::Overwrite)]
    );
}
