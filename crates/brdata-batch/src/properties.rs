use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;
use std::sync::OnceLock;

/// Get shared writer properties (cached)
///
/// Configuration optimized for size and scan performance:
/// - Snappy compression
/// - Dictionary encoding enabled (DATASUS columns are low-cardinality codes)
/// - Page-level statistics
pub fn writer_properties() -> &'static WriterProperties {
    static PROPERTIES: OnceLock<WriterProperties> = OnceLock::new();
    PROPERTIES.get_or_init(|| {
        let metadata = vec![
            KeyValue {
                key: "brdata.version".to_string(),
                value: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            KeyValue {
                key: "schema.source".to_string(),
                value: Some("dbf".to_string()),
            },
        ];

        WriterProperties::builder()
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_compression(Compression::SNAPPY)
            .set_data_page_size_limit(256 * 1024)
            .set_write_batch_size(32 * 1024)
            .set_dictionary_page_size_limit(128 * 1024)
            .set_key_value_metadata(Some(metadata))
            .build()
    })
}
