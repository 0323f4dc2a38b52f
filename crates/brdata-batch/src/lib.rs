// brdata-batch - Legacy binary to columnar conversion
//
// Reads DATASUS .dbc/.dbf files in bounded-size batches and appends each
// batch to a directory of Parquet parts. The .dbc decode pass is fully
// materialized in a scoped temp file before batching starts.

pub mod batched;
pub mod convert;
pub mod dbc;
pub mod dbf;
pub mod error;
pub mod implode;
pub mod properties;

pub use batched::{batched, Batched};
pub use convert::{
    convert_dbf, convert_to_parquet, list_parts, BatchConversionState, ConversionReport,
    ConvertOptions, LegacyFormat, DEFAULT_BATCH_ROWS,
};
pub use dbf::{DbfField, DbfReader};
pub use error::ConvertError;
