//! Legacy binary → Parquet batch conversion
//!
//! The destination is a directory of Parquet part files. The first batch
//! creates `part-00000.parquet`; every later batch (in this run or a later one)
//! appends the next part. Existing parts are never rewritten, so each step
//! costs O(batch) regardless of how much has already been converted.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::{debug, info, warn};

use crate::batched::Batched;
use crate::dbc;
use crate::dbf::DbfReader;
use crate::error::{ConvertError, Result};
use crate::properties::writer_properties;

pub const DEFAULT_BATCH_ROWS: usize = 1_000_000;

const PART_PREFIX: &str = "part-";
const PART_SUFFIX: &str = ".parquet";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Rows per batch; must be at least 1.
    pub batch_rows: usize,
    /// Where the decoded intermediate goes. System temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFormat {
    Dbc,
    Dbf,
}

impl LegacyFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dbc" => Some(Self::Dbc),
            "dbf" => Some(Self::Dbf),
            _ => None,
        }
    }
}

/// Where a conversion stands: rows consumed so far and whether the
/// destination already holds data (append) or not (create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConversionState {
    pub cursor: u64,
    pub destination_exists: bool,
    next_part: usize,
}

impl BatchConversionState {
    /// Inspect the destination. An existing destination must have the same
    /// column order as `schema`.
    fn open(destination: &Path, schema: &Schema) -> Result<Self> {
        let parts = list_parts(destination)?;
        if let Some(first) = parts.first() {
            let existing = ParquetRecordBatchReaderBuilder::try_new(File::open(first)?)?
                .schema()
                .clone();
            let existing_names: Vec<&String> =
                existing.fields().iter().map(|f| f.name()).collect();
            let names: Vec<&String> = schema.fields().iter().map(|f| f.name()).collect();
            if existing_names != names {
                return Err(ConvertError::invalid_argument(format!(
                    "destination {} has columns {:?}, source has {:?}",
                    destination.display(),
                    existing_names,
                    names
                )));
            }
        }
        Ok(Self {
            cursor: 0,
            destination_exists: !parts.is_empty(),
            next_part: parts.len(),
        })
    }

    fn part_path(&self, destination: &Path) -> PathBuf {
        destination.join(format!("{PART_PREFIX}{:05}{PART_SUFFIX}", self.next_part))
    }

    fn advance(&mut self, rows: usize) {
        self.cursor += rows as u64;
        self.next_part += 1;
        self.destination_exists = true;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub rows: u64,
    pub batches: usize,
    pub parts: Vec<PathBuf>,
}

/// Convert a `.dbc` or `.dbf` file into Parquet parts under `destination`.
pub fn convert_to_parquet(
    source: &Path,
    destination: &Path,
    options: &ConvertOptions,
) -> Result<ConversionReport> {
    if options.batch_rows < 1 {
        return Err(ConvertError::invalid_argument("batch_rows must be at least 1"));
    }
    let format = LegacyFormat::from_path(source).ok_or_else(|| {
        ConvertError::invalid_argument(format!(
            "{} is not a .dbc or .dbf file",
            source.display()
        ))
    })?;

    match format {
        LegacyFormat::Dbf => {
            let reader = BufReader::new(File::open(source)?);
            convert_dbf(reader, destination, options.batch_rows)
        }
        LegacyFormat::Dbc => {
            // Dropped at the end of this arm, removing the intermediate
            // whether or not batching succeeded.
            let decoded = dbc::decode_to_temp(source, options.temp_dir.as_deref())?;
            let reader = BufReader::new(File::open(decoded.path())?);
            convert_dbf(reader, destination, options.batch_rows)
        }
    }
}

/// Batch a DBF stream into Parquet parts.
pub fn convert_dbf<R: Read>(
    reader: R,
    destination: &Path,
    batch_rows: usize,
) -> Result<ConversionReport> {
    let dbf = DbfReader::new(reader)?;
    let schema = string_schema(&dbf.column_names());
    let batches = Batched::new(dbf, batch_rows)?;

    let created_destination = !destination.exists();
    std::fs::create_dir_all(destination)?;
    let mut state = BatchConversionState::open(destination, &schema)?;
    let mut report = ConversionReport::default();

    let written = (|| -> Result<()> {
        for rows in batches {
            let rows = rows?;
            let batch = to_record_batch(&schema, &rows)?;
            let path = state.part_path(destination);
            // Registered before writing so a half-written part is removed too.
            report.parts.push(path.clone());
            write_part(&path, &batch)?;

            debug!(
                part = %path.display(),
                rows = rows.len(),
                cursor = state.cursor,
                append = state.destination_exists,
                "Wrote Parquet part"
            );
            state.advance(rows.len());
            report.batches += 1;
        }
        Ok(())
    })();

    if let Err(e) = written {
        discard_parts(destination, &report.parts, created_destination);
        return Err(e);
    }

    report.rows = state.cursor;
    info!(
        destination = %destination.display(),
        rows = report.rows,
        batches = report.batches,
        "Converted legacy file"
    );
    Ok(report)
}

/// Remove the parts written by a failed conversion. Parts from earlier
/// conversions are left alone.
fn discard_parts(destination: &Path, parts: &[PathBuf], created_destination: bool) {
    for part in parts {
        if let Err(e) = std::fs::remove_file(part) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(part = %part.display(), error = %e, "Failed to remove partial part");
            }
        }
    }
    if created_destination {
        // Only succeeds when nothing else landed there.
        let _ = std::fs::remove_dir(destination);
    }
    warn!(
        destination = %destination.display(),
        parts = parts.len(),
        "Discarded output of failed conversion"
    );
}

fn string_schema(columns: &[String]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

fn to_record_batch(schema: &SchemaRef, rows: &[Vec<Option<String>>]) -> Result<RecordBatch> {
    let mut builders: Vec<StringBuilder> = schema
        .fields()
        .iter()
        .map(|_| StringBuilder::with_capacity(rows.len(), rows.len() * 8))
        .collect();

    for row in rows {
        for (builder, value) in builders.iter_mut().zip(row) {
            builder.append_option(value.as_deref());
        }
    }

    let columns: Vec<ArrayRef> = builders
        .into_iter()
        .map(|mut b| Arc::new(b.finish()) as ArrayRef)
        .collect();
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

fn write_part(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties().clone()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Existing part files, in part order.
pub fn list_parts(destination: &Path) -> Result<Vec<PathBuf>> {
    if !destination.exists() {
        return Ok(Vec::new());
    }
    let mut parts: Vec<PathBuf> = std::fs::read_dir(destination)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PART_PREFIX) && n.ends_with(PART_SUFFIX))
        })
        .collect();
    parts.sort();
    Ok(parts)
}
