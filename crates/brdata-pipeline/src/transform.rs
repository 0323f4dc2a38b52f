//! Source files to records
//!
//! Delimited text is read with the table's delimiter and encoding, the header
//! is renamed through the table's dictionary, and blank fields become nulls.

use std::io::{Cursor, Read};

use brdata_core::{
    correct_and_key, max_watermark, CorrectedRecord, PartitionKey, PartitionScheme, Record,
    RenameTable, SourceFormat, TableSpec, TextEncoding, Value, Watermark,
};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// File name of a source URL, query string removed.
pub fn source_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

pub fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Pull `<stem>.csv` out of a zip archive. An archive with a single CSV entry
/// is accepted whatever that entry is called.
pub fn extract_csv(archive: &[u8], file: &str) -> Result<Vec<u8>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| PipelineError::decode(file, e))?;

    let wanted = format!("{}.csv", file_stem(file)).to_ascii_lowercase();
    let csv_entries: Vec<String> = zip
        .file_names()
        .filter(|name| name.to_ascii_lowercase().ends_with(".csv"))
        .map(String::from)
        .collect();
    let entry = csv_entries
        .iter()
        .find(|name| {
            let base = name.rsplit('/').next().unwrap_or(name);
            base.to_ascii_lowercase() == wanted
        })
        .or_else(|| (csv_entries.len() == 1).then(|| &csv_entries[0]))
        .ok_or_else(|| PipelineError::decode(file, format!("archive has no {}", wanted)))?
        .clone();

    let mut content = Vec::new();
    zip.by_name(&entry)
        .map_err(|e| PipelineError::decode(file, e))?
        .read_to_end(&mut content)
        .map_err(|e| PipelineError::decode(file, e))?;
    debug!(file, entry = %entry, bytes = content.len(), "Extracted archive entry");
    Ok(content)
}

fn decode_text(bytes: &[u8], encoding: TextEncoding, file: &str) -> Result<String> {
    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(bytes)
            .map(String::from)
            .map_err(|e| PipelineError::decode(file, e)),
        TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Parse delimited text into records with canonical column names.
pub fn parse_delimited(
    data: &[u8],
    delimiter: u8,
    encoding: TextEncoding,
    rename: &RenameTable,
    file: &str,
) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(data);

    let header = reader
        .byte_headers()
        .map_err(|e| PipelineError::decode(file, e))?
        .iter()
        .map(|field| {
            decode_text(field, encoding, file)
                .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
        })
        .collect::<Result<Vec<_>>>()?;
    let columns = rename.rename_header(&header);

    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row.map_err(|e| PipelineError::decode(file, e))?;
        let mut record = Record::with_capacity(columns.len());
        for (column, field) in columns.iter().zip(row.iter()) {
            let text = decode_text(field, encoding, file)?;
            record.push(column.clone(), Value::from_field(&text));
        }
        records.push(record);
    }
    Ok(records)
}

/// Records of one source file, whatever its text container.
pub fn read_records(spec: &TableSpec, file: &str, bytes: &[u8]) -> Result<Vec<Record>> {
    match spec.format {
        SourceFormat::Csv => parse_delimited(bytes, spec.delimiter, spec.encoding, &spec.rename, file),
        SourceFormat::ZipCsv => {
            let csv = extract_csv(bytes, file)?;
            parse_delimited(&csv, spec.delimiter, spec.encoding, &spec.rename, file)
        }
        SourceFormat::Dbc | SourceFormat::Dbf => Err(PipelineError::invalid_argument(format!(
            "{} is a legacy binary source and takes the conversion path",
            file
        ))),
    }
}

/// Transformed record set ready for the partition writer.
#[derive(Debug, Default)]
pub struct Transformed {
    pub keyed: Vec<(PartitionKey, CorrectedRecord)>,
    pub records_read: u64,
    pub records_dropped: u64,
    pub watermark: Option<Watermark>,
}

/// Correct and key every record. Unpartitionable records are dropped and
/// counted. The watermark covers kept records only.
pub fn key_records(records: Vec<Record>, spec: &TableSpec, scheme: &PartitionScheme) -> Transformed {
    let mut out = Transformed {
        records_read: records.len() as u64,
        ..Default::default()
    };

    for record in records {
        let (corrected, key) = correct_and_key(record, scheme);
        match key {
            Ok(key) => out.keyed.push((key, corrected)),
            Err(reason) => {
                debug!(reason = %reason, "Dropping unpartitionable record");
                out.records_dropped += 1;
            }
        }
    }

    out.watermark = max_watermark(out.keyed.iter().map(|(_, r)| r.as_record()), &spec.watermark);
    out
}
