//! Hive-style partitioned CSV output
//!
//! Every expected partition directory is created up-front, records are grouped
//! by key, and each group becomes `<root>/<table>/ano=<y>/mes=<m>[/sigla_uf=<uf>]/<table>.csv`.
//! The table directory is replaced wholesale on every write.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use brdata_config::{FailurePolicy, PartitionConfig};
use brdata_core::{CorrectedRecord, PartitionKey, PartitionScheme};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, WriterError};

#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub root: PathBuf,
    pub table_id: String,
    /// Output column order. Empty means first-seen order across the records.
    pub column_order: Vec<String>,
    pub write_empty_partitions: bool,
    pub failure_policy: FailurePolicy,
    pub max_concurrent_writes: usize,
}

impl WriterOptions {
    pub fn new(root: impl Into<PathBuf>, table_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            table_id: table_id.into(),
            column_order: Vec::new(),
            write_empty_partitions: true,
            failure_policy: FailurePolicy::Abort,
            max_concurrent_writes: 1,
        }
    }

    pub fn with_partition_config(mut self, config: &PartitionConfig) -> Self {
        self.write_empty_partitions = config.write_empty_partitions;
        self.failure_policy = config.failure_policy;
        self.max_concurrent_writes = config.max_concurrent_writes;
        self
    }

    pub fn with_column_order(mut self, columns: Vec<String>) -> Self {
        self.column_order = columns;
        self
    }
}

/// Outcome of one partitioned write.
#[derive(Debug, Default)]
pub struct PartitionReport {
    /// Sorted.
    pub files_written: Vec<PathBuf>,
    pub rows_per_file: BTreeMap<PathBuf, usize>,
    /// Only populated under `FailurePolicy::Isolate`.
    pub failed: Vec<(PartitionKey, String)>,
    pub directories_created: usize,
}

impl PartitionReport {
    pub fn rows_written(&self) -> usize {
        self.rows_per_file.values().sum()
    }

    fn record_file(&mut self, path: PathBuf, rows: usize) {
        self.rows_per_file.insert(path.clone(), rows);
        self.files_written.push(path);
    }
}

/// Destination for a single partition group.
pub trait PartitionSink: Sync {
    fn write_partition(
        &self,
        path: &Path,
        columns: &[String],
        rows: &[CorrectedRecord],
    ) -> Result<()>;
}

/// UTF-8, comma-separated, header row, empty string for missing values.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSink;

impl PartitionSink for CsvSink {
    fn write_partition(
        &self,
        path: &Path,
        columns: &[String],
        rows: &[CorrectedRecord],
    ) -> Result<()> {
        let fail = |e: csv::Error| {
            WriterError::write_failure(format!("{}: {}", path.display(), e))
        };

        let mut writer = csv::Writer::from_path(path).map_err(fail)?;
        writer.write_record(columns).map_err(fail)?;
        for row in rows {
            let record = row.as_record();
            writer
                .write_record(columns.iter().map(|column| {
                    record
                        .get(column)
                        .map(|value| value.to_string())
                        .unwrap_or_default()
                }))
                .map_err(fail)?;
        }
        writer
            .flush()
            .map_err(|e| WriterError::write_failure(format!("{}: {}", path.display(), e)))
    }
}

pub struct PartitionWriter<S = CsvSink> {
    scheme: PartitionScheme,
    options: WriterOptions,
    sink: S,
}

impl PartitionWriter<CsvSink> {
    pub fn new(scheme: PartitionScheme, options: WriterOptions) -> Result<Self> {
        Self::with_sink(scheme, options, CsvSink)
    }
}

impl<S: PartitionSink> PartitionWriter<S> {
    pub fn with_sink(scheme: PartitionScheme, options: WriterOptions, sink: S) -> Result<Self> {
        if options.max_concurrent_writes == 0 {
            return Err(WriterError::invalid_config(
                "max_concurrent_writes must be at least 1".to_string(),
            ));
        }
        if options.table_id.is_empty()
            || options.table_id.contains(['/', '\\'])
            || options.table_id.starts_with('.')
        {
            return Err(WriterError::invalid_config(format!(
                "invalid table id '{}'",
                options.table_id
            )));
        }
        Ok(Self {
            scheme,
            options,
            sink,
        })
    }

    pub fn table_dir(&self) -> PathBuf {
        self.options.root.join(&self.options.table_id)
    }

    pub fn partition_dir(&self, key: &PartitionKey) -> PathBuf {
        self.table_dir().join(key.relative_dir())
    }

    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.partition_dir(key)
            .join(format!("{}.csv", self.options.table_id))
    }

    /// Create every expected partition directory. Existing directories are fine.
    pub fn create_layout(&self) -> Result<usize> {
        let keys = self.scheme.expected_keys();
        for key in &keys {
            let dir = self.partition_dir(key);
            fs::create_dir_all(&dir).map_err(|e| {
                WriterError::write_failure(format!("create {}: {}", dir.display(), e))
            })?;
        }
        debug!(
            table_id = %self.options.table_id,
            directories = keys.len(),
            "Partition layout created"
        );
        Ok(keys.len())
    }

    pub fn write<I>(&self, records: I) -> Result<PartitionReport>
    where
        I: IntoIterator<Item = (PartitionKey, CorrectedRecord)>,
    {
        self.write_until(records, &AtomicBool::new(false))
    }

    /// Like [`write`](Self::write), but stops issuing new partition writes once
    /// `cancel` is set. Writes already in flight complete.
    ///
    /// Every record is grouped by key before the first write, so all groups
    /// are held at once; the header needs the first-seen column order across
    /// the whole input anyway. The caller's record set is moved in, not
    /// copied, so peak memory is one copy of the input.
    pub fn write_until<I>(&self, records: I, cancel: &AtomicBool) -> Result<PartitionReport>
    where
        I: IntoIterator<Item = (PartitionKey, CorrectedRecord)>,
    {
        let table_dir = self.table_dir();
        if table_dir.exists() {
            fs::remove_dir_all(&table_dir).map_err(|e| {
                WriterError::write_failure(format!("clear {}: {}", table_dir.display(), e))
            })?;
        }
        let directories_created = self.create_layout()?;

        let mut groups: BTreeMap<PartitionKey, Vec<CorrectedRecord>> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut first_seen = Vec::new();
        for (key, record) in records {
            if self.options.column_order.is_empty() {
                for column in record.as_record().columns() {
                    if seen.insert(column.to_string()) {
                        first_seen.push(column.to_string());
                    }
                }
            }
            groups.entry(key).or_default().push(record);
        }
        if self.options.write_empty_partitions {
            for key in self.scheme.expected_keys() {
                groups.entry(key).or_default();
            }
        }

        let columns = self.output_columns(first_seen);
        let workers = self.options.max_concurrent_writes.min(groups.len()).max(1);

        let queue = Mutex::new(groups);
        let report = Mutex::new(PartitionReport {
            directories_created,
            ..Default::default()
        });
        let first_error: Mutex<Option<WriterError>> = Mutex::new(None);
        let stop = AtomicBool::new(false);

        let work = || loop {
            if stop.load(Ordering::Acquire) || cancel.load(Ordering::Acquire) {
                break;
            }
            let Some((key, rows)) = queue.lock().pop_first() else {
                break;
            };

            let path = self.partition_path(&key);
            match self.write_group(&path, &columns, &rows) {
                Ok(()) => report.lock().record_file(path, rows.len()),
                Err(e) => match self.options.failure_policy {
                    FailurePolicy::Abort => {
                        stop.store(true, Ordering::Release);
                        first_error.lock().get_or_insert(e);
                        break;
                    }
                    FailurePolicy::Isolate => {
                        warn!(partition = %key, error = %e, "Partition write failed");
                        report.lock().failed.push((key, e.to_string()));
                    }
                },
            }
        };

        if workers == 1 {
            work();
        } else {
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(&work);
                }
            });
        }

        if let Some(error) = first_error.into_inner() {
            return Err(error);
        }
        let mut report = report.into_inner();
        if cancel.load(Ordering::Acquire) && !queue.into_inner().is_empty() {
            return Err(WriterError::cancelled(report.files_written.len()));
        }

        report.files_written.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        info!(
            table_id = %self.options.table_id,
            files = report.files_written.len(),
            rows = report.rows_written(),
            failed = report.failed.len(),
            "Partitions written"
        );
        Ok(report)
    }

    fn write_group(&self, path: &Path, columns: &[String], rows: &[CorrectedRecord]) -> Result<()> {
        // Keys outside the scheme have no pre-created directory.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                WriterError::write_failure(format!("create {}: {}", parent.display(), e))
            })?;
        }
        self.sink.write_partition(path, columns, rows)
    }

    fn output_columns(&self, first_seen: Vec<String>) -> Vec<String> {
        let partition_columns = self.scheme.partition_columns();
        let base = if self.options.column_order.is_empty() {
            first_seen
        } else {
            self.options.column_order.clone()
        };
        base.into_iter()
            .filter(|column| !partition_columns.contains(&column.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brdata_core::{correct_and_key, Granularity, Record, Value};

    fn scheme(granularity: Granularity) -> PartitionScheme {
        PartitionScheme::new(granularity)
            .with_years(2020..2021)
            .unwrap()
    }

    fn sp_row(municipality: i64, value: &str) -> Record {
        [
            ("ano", Value::Int(2020)),
            ("mes", Value::Int(3)),
            ("sigla_uf", Value::from("SP")),
            ("id_municipio", Value::Int(municipality)),
            ("valor", Value::from(value)),
        ]
        .into_iter()
        .collect()
    }

    fn keyed(records: Vec<Record>, scheme: &PartitionScheme) -> Vec<(PartitionKey, CorrectedRecord)> {
        records
            .into_iter()
            .filter_map(|record| {
                let (corrected, key) = correct_and_key(record, scheme);
                key.ok().map(|key| (key, corrected))
            })
            .collect()
    }

    #[test]
    fn writes_corrected_group_without_partition_columns() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = scheme(Granularity::MonthState);
        let writer = PartitionWriter::new(
            scheme.clone(),
            WriterOptions::new(dir.path(), "municipio_exportacao"),
        )
        .unwrap();

        let rows = keyed(vec![sp_row(3_400_000, "10"), sp_row(3_600_000, "")], &scheme);
        let report = writer.write(rows).unwrap();

        let path = dir
            .path()
            .join("municipio_exportacao/ano=2020/mes=3/sigla_uf=SP/municipio_exportacao.csv");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id_municipio,valor\n3500000,10\n3600000,\n");
        assert_eq!(report.rows_per_file[&path], 2);
        assert_eq!(report.rows_written(), 2);
        assert_eq!(report.directories_created, 12 * 27);
    }

    #[test]
    fn creates_every_expected_directory_for_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = scheme(Granularity::Month);
        let options = WriterOptions::new(dir.path(), "ncm_importacao")
            .with_column_order(vec!["ano".into(), "mes".into(), "id_ncm".into()]);
        let writer = PartitionWriter::new(scheme, options).unwrap();

        let report = writer.write(Vec::new()).unwrap();
        assert_eq!(report.files_written.len(), 12);
        for month in 1..=12 {
            let path = dir.path().join(format!(
                "ncm_importacao/ano=2020/mes={}/ncm_importacao.csv",
                month
            ));
            assert_eq!(fs::read_to_string(path).unwrap(), "id_ncm\n");
        }
    }

    #[test]
    fn empty_partitions_can_stay_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = WriterOptions::new(dir.path(), "ncm_importacao");
        options.write_empty_partitions = false;
        let writer = PartitionWriter::new(scheme(Granularity::Month), options).unwrap();

        let report = writer.write(Vec::new()).unwrap();
        assert!(report.files_written.is_empty());
        let month_dir = dir.path().join("ncm_importacao/ano=2020/mes=7");
        assert!(month_dir.is_dir());
        assert_eq!(fs::read_dir(month_dir).unwrap().count(), 0);
    }

    #[test]
    fn rewrites_table_instead_of_merging() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = scheme(Granularity::MonthState);
        let writer = PartitionWriter::new(
            scheme.clone(),
            WriterOptions::new(dir.path(), "municipio_exportacao"),
        )
        .unwrap();

        writer
            .write(keyed(vec![sp_row(3_600_000, "1"), sp_row(3_600_001, "2")], &scheme))
            .unwrap();
        writer
            .write(keyed(vec![sp_row(3_600_002, "3")], &scheme))
            .unwrap();

        let path = writer.partition_path(&PartitionKey::parse("ano=2020/mes=3/sigla_uf=SP").unwrap());
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "id_municipio,valor\n3600002,3\n");
    }

    #[test]
    fn configured_column_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = scheme(Granularity::MonthState);
        let options = WriterOptions::new(dir.path(), "t").with_column_order(vec![
            "ano".into(),
            "valor".into(),
            "id_municipio".into(),
            "extra".into(),
        ]);
        let writer = PartitionWriter::new(scheme.clone(), options).unwrap();

        writer.write(keyed(vec![sp_row(3_600_000, "5")], &scheme)).unwrap();
        let path = writer.partition_path(&PartitionKey::parse("ano=2020/mes=3/sigla_uf=SP").unwrap());
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "valor,id_municipio,extra\n5,3600000,\n"
        );
    }

    struct FailOn(PathBuf);

    impl PartitionSink for FailOn {
        fn write_partition(
            &self,
            path: &Path,
            columns: &[String],
            rows: &[CorrectedRecord],
        ) -> Result<()> {
            if path == self.0 {
                return Err(WriterError::write_failure("disk full".to_string()));
            }
            CsvSink.write_partition(path, columns, rows)
        }
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = scheme(Granularity::Month);
        let failing = dir.path().join("t/ano=2020/mes=2/t.csv");
        let writer = PartitionWriter::with_sink(
            scheme,
            WriterOptions::new(dir.path(), "t"),
            FailOn(failing),
        )
        .unwrap();

        let err = writer.write(Vec::new()).unwrap_err();
        assert_eq!(err.code(), "E002");
        assert!(dir.path().join("t/ano=2020/mes=1/t.csv").exists());
        assert!(!dir.path().join("t/ano=2020/mes=3/t.csv").exists());
    }

    #[test]
    fn isolate_policy_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let scheme = scheme(Granularity::Month);
        let failing = dir.path().join("t/ano=2020/mes=2/t.csv");
        let mut options = WriterOptions::new(dir.path(), "t");
        options.failure_policy = FailurePolicy::Isolate;
        options.max_concurrent_writes = 4;
        let writer = PartitionWriter::with_sink(scheme, options, FailOn(failing)).unwrap();

        let report = writer.write(Vec::new()).unwrap();
        assert_eq!(report.files_written.len(), 11);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.to_string(), "ano=2020/mes=2");
    }

    #[test]
    fn cancelled_write_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let writer =
            PartitionWriter::new(scheme(Granularity::Month), WriterOptions::new(dir.path(), "t"))
                .unwrap();

        let cancel = AtomicBool::new(true);
        let err = writer.write_until(Vec::new(), &cancel).unwrap_err();
        assert!(matches!(err, WriterError::Cancelled { written: 0, .. }));
    }

    #[test]
    fn rejects_bad_options() {
        let scheme = scheme(Granularity::Month);
        let mut options = WriterOptions::new("/tmp", "t");
        options.max_concurrent_writes = 0;
        assert!(PartitionWriter::new(scheme.clone(), options).is_err());
        assert!(PartitionWriter::new(scheme, WriterOptions::new("/tmp", "../t")).is_err());
    }
}
