// brdata-core - Pure ingestion logic
//
// Record model, column dictionaries, municipality code correction, partition
// keys, watermarks and the freshness gate. No I/O, no async.

pub mod catalog;
pub mod geo;
pub mod municipality;
pub mod partition;
pub mod record;
pub mod rename;
pub mod staleness;
pub mod watermark;

pub use catalog::{SourceFormat, TableSpec, TextEncoding};
pub use geo::{BrazilState, Month};
pub use municipality::{correct_record, Correct, CorrectedRecord, MunicipalityCode, SourceCode};
pub use partition::{
    correct_and_key, derive_partition_key, Granularity, PartitionKey, PartitionScheme,
    Unpartitionable,
};
pub use record::{Record, Value};
pub use rename::RenameTable;
pub use staleness::is_stale;
pub use watermark::{max_watermark, DateFormat, Watermark, WatermarkSource};
