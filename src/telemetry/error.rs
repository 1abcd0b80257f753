//! Telemetry decoding error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or decoding a log file
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log file could not be opened or read
    #[error("cannot read {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure in the middle of a scan
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a log this decoder understands
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),

    /// A message definition or payload could not be decoded
    #[error("malformed log: {0}")]
    Malformed(String),
}

/// Result type alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::UnsupportedFormat("missing message header".to_string());
        assert_eq!(
            err.to_string(),
            "unsupported log format: missing message header"
        );
    }
}
