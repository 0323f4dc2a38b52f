// Built-in table catalog
//
// Everything the pipeline needs to know about a published table that is not
// a per-run setting: where it comes from, how it is encoded, how its columns
// are named and how it is partitioned.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::partition::{Granularity, PartitionScheme};
use crate::rename::{RenameTable, COMEX_MUN, COMEX_NCM, IDENTITY};
use crate::watermark::{DateFormat, WatermarkSource};

/// Shape of the downloaded source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Delimited text.
    Csv,
    /// Zip archive holding `<stem>.csv`.
    ZipCsv,
    /// DATASUS compressed DBF.
    Dbc,
    Dbf,
}

impl SourceFormat {
    /// Legacy binary formats go through the columnar converter instead of
    /// the partitioning writer.
    pub fn is_legacy(&self) -> bool {
        matches!(self, SourceFormat::Dbc | SourceFormat::Dbf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1
    Latin1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub dataset_id: String,
    pub table_id: String,
    pub sources: Vec<String>,
    pub format: SourceFormat,
    pub delimiter: u8,
    pub encoding: TextEncoding,
    pub rename: RenameTable,
    pub granularity: Granularity,
    /// Output column order. Empty means first-seen order.
    pub column_order: Vec<String>,
    pub watermark: WatermarkSource,
    pub date_format: DateFormat,
}

impl TableSpec {
    pub fn scheme(&self) -> PartitionScheme {
        PartitionScheme::new(self.granularity)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.dataset_id, self.table_id)
    }
}

const COMEX_BASE_URL: &str = "https://balanca.economia.gov.br/balanca/bd/comexstat-bd";

fn comex(table_id: &str, stem: &str, by_municipality: bool) -> TableSpec {
    let (folder, rename, granularity) = if by_municipality {
        ("mun", COMEX_MUN, Granularity::MonthState)
    } else {
        ("ncm", COMEX_NCM, Granularity::Month)
    };
    TableSpec {
        dataset_id: "br_me_comex_stat".to_string(),
        table_id: table_id.to_string(),
        sources: vec![format!("{COMEX_BASE_URL}/{folder}/{stem}.zip")],
        format: SourceFormat::ZipCsv,
        delimiter: b';',
        encoding: TextEncoding::Utf8,
        rename,
        granularity,
        column_order: Vec::new(),
        watermark: WatermarkSource::YearMonth,
        date_format: DateFormat::YearMonth,
    }
}

pub static CATALOG: Lazy<Vec<TableSpec>> = Lazy::new(|| {
    vec![
        comex("municipio_exportacao", "EXP_COMPLETA_MUN", true),
        comex("municipio_importacao", "IMP_COMPLETA_MUN", true),
        comex("ncm_exportacao", "EXP_COMPLETA", false),
        comex("ncm_importacao", "IMP_COMPLETA", false),
        // DATASUS ambulatory production. Source files are per state/month and
        // have to be supplied through `pipeline.sources`.
        TableSpec {
            dataset_id: "br_ms_sia".to_string(),
            table_id: "producao_ambulatorial".to_string(),
            sources: Vec::new(),
            format: SourceFormat::Dbc,
            delimiter: b',',
            encoding: TextEncoding::Latin1,
            rename: IDENTITY,
            granularity: Granularity::Month,
            column_order: Vec::new(),
            watermark: WatermarkSource::YearMonth,
            date_format: DateFormat::YearMonth,
        },
    ]
});

pub fn lookup(dataset_id: &str, table_id: &str) -> Option<&'static TableSpec> {
    CATALOG
        .iter()
        .find(|spec| spec.dataset_id == dataset_id && spec.table_id == table_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_comex() {
        let spec = lookup("br_me_comex_stat", "municipio_exportacao").unwrap();
        assert_eq!(
            spec.sources,
            vec!["https://balanca.economia.gov.br/balanca/bd/comexstat-bd/mun/EXP_COMPLETA_MUN.zip"]
        );
        assert_eq!(spec.granularity, Granularity::MonthState);
        assert_eq!(spec.delimiter, b';');
        assert_eq!(spec.rename, COMEX_MUN);

        let ncm = lookup("br_me_comex_stat", "ncm_importacao").unwrap();
        assert!(ncm.sources[0].ends_with("/ncm/IMP_COMPLETA.zip"));
        assert_eq!(ncm.granularity, Granularity::Month);
    }

    #[test]
    fn test_lookup_missing() {
        assert!(lookup("br_me_comex_stat", "nope").is_none());
    }

    #[test]
    fn test_legacy_formats() {
        assert!(SourceFormat::Dbc.is_legacy());
        assert!(SourceFormat::Dbf.is_legacy());
        assert!(!SourceFormat::ZipCsv.is_legacy());
    }
}
