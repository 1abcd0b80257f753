//! Query error types
//!
//! Every failure during a re-scan aborts the whole query; callers never see a
//! partial series or a truncated CSV.

use crate::telemetry::TelemetryError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Message type absent from the session's index
    #[error("message type {0} not found")]
    UnknownMessageType(String),

    /// Message type has nothing to export
    #[error("no numeric fields in message")]
    NoNumericFields,

    /// Bad query argument
    #[error("{0}")]
    Invalid(String),

    /// Re-scanning the log failed
    #[error("failed to {op}: {source}")]
    Scan {
        op: &'static str,
        #[source]
        source: TelemetryError,
    },

    /// CSV export failed while scanning or writing
    #[error("CSV generation failed: {0}")]
    Csv(String),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            QueryError::UnknownMessageType("XYZ".into()).to_string(),
            "message type XYZ not found"
        );
        let err = QueryError::Scan {
            op: "dump messages",
            source: TelemetryError::Malformed("bad FMT".into()),
        };
        assert!(err.to_string().starts_with("failed to dump messages: "));
    }
}
