//! Error types for the batch converter

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// Caller error: bad batch size, mismatched destination schema.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The source could not be decoded. No output is produced.
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl ConvertError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
