//! Error types for the writer crate

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Configuration missing or invalid
    E001InvalidConfig,
    /// E002: Local partition write failed
    E002WriteFailure,
    /// E003: Storage operator could not be built
    E003StorageUnavailable,
    /// E004: Upload to the warehouse failed
    E004UploadFailure,
    /// E005: Write stopped by the caller
    E005Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidConfig => "E001",
            Self::E002WriteFailure => "E002",
            Self::E003StorageUnavailable => "E003",
            Self::E004UploadFailure => "E004",
            Self::E005Cancelled => "E005",
        }
    }
}

/// Errors that can occur while writing partitions or uploading them
#[derive(Debug, Error)]
pub enum WriterError {
    /// Invalid configuration provided
    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    /// Writing a partition file failed
    #[error("[{code}] Write operation failed: {message}")]
    WriteFailure { code: &'static str, message: String },

    #[error("[{code}] Storage backend '{backend}' unavailable: {reason}\n\nTroubleshooting:\n  • Check the [storage] section of the config\n  • Verify bucket/region or filesystem path")]
    StorageUnavailable {
        code: &'static str,
        backend: String,
        reason: String,
    },

    #[error("[{code}] Upload failed for '{path}': {reason}")]
    UploadFailure {
        code: &'static str,
        path: String,
        reason: String,
    },

    #[error("[{code}] Partition write cancelled after {written} files")]
    Cancelled { code: &'static str, written: usize },
}

impl WriterError {
    /// Create an invalid config error with error code
    pub fn invalid_config(message: String) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E001InvalidConfig.as_str(),
            message,
        }
    }

    /// Create a write failure error with error code
    pub fn write_failure(message: String) -> Self {
        Self::WriteFailure {
            code: ErrorCode::E002WriteFailure.as_str(),
            message,
        }
    }

    pub fn storage_unavailable(backend: String, reason: String) -> Self {
        Self::StorageUnavailable {
            code: ErrorCode::E003StorageUnavailable.as_str(),
            backend,
            reason,
        }
    }

    pub fn upload_failure(path: String, reason: String) -> Self {
        Self::UploadFailure {
            code: ErrorCode::E004UploadFailure.as_str(),
            path,
            reason,
        }
    }

    pub fn cancelled(written: usize) -> Self {
        Self::Cancelled {
            code: ErrorCode::E005Cancelled.as_str(),
            written,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { code, .. }
            | Self::WriteFailure { code, .. }
            | Self::StorageUnavailable { code, .. }
            | Self::UploadFailure { code, .. }
            | Self::Cancelled { code, .. } => code,
        }
    }
}

/// Result type alias for WriterError
pub type Result<T> = std::result::Result<T, WriterError>;
