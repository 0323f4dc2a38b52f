//! Partitioned output and warehouse upload
//!
//! Writes corrected records into a Hive-style directory tree of CSV files and
//! mirrors finished trees into the configured object storage.

mod error;
mod partition_writer;
mod storage;
mod upload;

pub use error::{ErrorCode, Result, WriterError};
pub use partition_writer::{
    CsvSink, PartitionReport, PartitionSink, PartitionWriter, WriterOptions,
};
pub use storage::build_operator;
pub use upload::{upload_tree, UploadReport};
