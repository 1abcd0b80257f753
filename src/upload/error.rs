//! Upload error types

use crate::telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while receiving, reassembling or analyzing an upload
#[derive(Error, Debug)]
pub enum UploadError {
    /// Malformed request (missing id, bad index, changed total)
    #[error("{0}")]
    Invalid(String),

    /// An earlier attempt to finish this upload failed
    #[error("upload {upload_id} failed: {reason}")]
    Failed { upload_id: String, reason: String },

    #[error("failed to reassemble upload: {0}")]
    Reassemble(#[source] std::io::Error),

    #[error("failed to decompress upload: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to parse log: {0}")]
    Parse(#[from] TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled
    #[error("upload task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(err: tokio::task::JoinError) -> Self {
        UploadError::Task(err.to_string())
    }
}

/// Result type alias for upload operations
pub type UploadResult<T> = Result<T, UploadError>;
