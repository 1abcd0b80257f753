//! Persistence error types

use thiserror::Error;

/// Errors raised by profile stores
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Rejected input (empty names and the like)
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Backend database failure
    #[error("Database error: {0}")]
    Database(String),

    /// Document (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backing files could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PersistenceError = err.into();
        assert!(matches!(err, PersistenceError::Serialization(_)));
    }
}
