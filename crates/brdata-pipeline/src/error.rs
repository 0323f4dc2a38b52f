use std::fmt;

use brdata_batch::ConvertError;
use brdata_core::Unpartitionable;
use brdata_writer::WriterError;
use thiserror::Error;

use crate::state::PipelineState;

/// Error classification for pipeline runs
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// A source could not be fetched. Not retried.
    #[error("Failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    /// A source could not be decoded. Intermediates are removed.
    #[error("Failed to decode {file}: {message}")]
    Decode { file: String, message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Recoverable: the record is dropped and counted.
    #[error("Record cannot be partitioned: {reason}")]
    Unpartitionable { reason: String },

    #[error("Materialization did not finish after {attempts} attempts")]
    MaterializationTimeout { attempts: u32 },

    /// The downstream job reported failure. Not retried.
    #[error("Materialization run {run_id} failed: {message}")]
    MaterializationFailed { run_id: String, message: String },

    #[error("Storage operation failed: {message}")]
    StorageFailed { message: String },

    #[error("Metadata update failed: {message}")]
    MetadataFailed { message: String },
}

impl PipelineError {
    pub fn network(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(file: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Decode {
            file: file.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn storage(message: impl fmt::Display) -> Self {
        Self::StorageFailed {
            message: message.to_string(),
        }
    }

    pub fn metadata(message: impl fmt::Display) -> Self {
        Self::MetadataFailed {
            message: message.to_string(),
        }
    }

    /// Map a batch conversion failure for `file`.
    pub fn from_convert(file: impl Into<String>, error: ConvertError) -> Self {
        match error {
            ConvertError::InvalidArgument(message) => Self::InvalidArgument { message },
            ConvertError::Decode(message) => Self::Decode {
                file: file.into(),
                message,
            },
            other => Self::storage(other),
        }
    }

    /// Error type string for logs and reports
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NetworkError",
            Self::Decode { .. } => "DecodeError",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::Unpartitionable { .. } => "Unpartitionable",
            Self::MaterializationTimeout { .. } => "MaterializationTimeout",
            Self::MaterializationFailed { .. } => "MaterializationFailed",
            Self::StorageFailed { .. } => "StorageFailed",
            Self::MetadataFailed { .. } => "MetadataFailed",
        }
    }

    /// Optional hint for fixing the error
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Network { .. } => {
                Some("Check that the source URL is reachable; the next run redownloads everything".into())
            }
            Self::MaterializationTimeout { .. } => Some(
                "Increase BRDATA_RETRY_ATTEMPTS or BRDATA_RETRY_INTERVAL_SECS".into(),
            ),
            Self::InvalidArgument { .. } => {
                Some("Check the dataset/table ids and the [pipeline] config section".into())
            }
            _ => None,
        }
    }
}

impl From<Unpartitionable> for PipelineError {
    fn from(error: Unpartitionable) -> Self {
        Self::Unpartitionable {
            reason: error.to_string(),
        }
    }
}

impl From<WriterError> for PipelineError {
    fn from(error: WriterError) -> Self {
        Self::storage(error)
    }
}

/// A pipeline error together with the state the run was in.
#[derive(Debug, Clone, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: PipelineState,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn error_type(&self) -> &'static str {
        self.error.error_type()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        assert_eq!(
            PipelineError::network("http://x", "timeout").error_type(),
            "NetworkError"
        );
        assert_eq!(
            PipelineError::MaterializationTimeout { attempts: 3 }.error_type(),
            "MaterializationTimeout"
        );
        assert_eq!(
            PipelineError::from(Unpartitionable::YearOutOfRange(1990)).error_type(),
            "Unpartitionable"
        );
    }

    #[test]
    fn test_convert_mapping() {
        let err = PipelineError::from_convert("a.dbc", ConvertError::decode("bad header"));
        assert!(matches!(err, PipelineError::Decode { ref file, .. } if file == "a.dbc"));

        let err = PipelineError::from_convert("a.dbc", ConvertError::invalid_argument("n"));
        assert_eq!(err.error_type(), "InvalidArgument");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = PipelineError::from_convert("a.dbc", ConvertError::Io(io));
        assert_eq!(err.error_type(), "StorageFailed");
    }

    #[test]
    fn test_hints() {
        let hint = PipelineError::MaterializationTimeout { attempts: 1 }
            .hint()
            .unwrap();
        assert!(hint.contains("BRDATA_RETRY_ATTEMPTS"));
        assert_eq!(PipelineError::storage("x").hint(), None);
    }

    #[test]
    fn test_stage_failure_display() {
        let failure = StageFailure {
            stage: PipelineState::Uploading,
            error: PipelineError::storage("bucket gone"),
        };
        assert_eq!(
            failure.to_string(),
            "UPLOADING failed: Storage operation failed: bucket gone"
        );
        assert_eq!(failure.error_type(), "StorageFailed");
    }
}
