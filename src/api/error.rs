//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::query::QueryError;
use crate::upload::UploadError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("{0}")]
    Validation(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Body over the configured limit (in MB)
    #[error("File too large. Maximum upload size is {0}MB.")]
    PayloadTooLarge(usize),

    /// Upload, reassembly or indexing error
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Query execution error
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Profile store error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Internal server error
    #[error("{0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(e) => match e {
                UploadError::Invalid(_) | UploadError::Failed { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Query(e) => match e {
                QueryError::UnknownMessageType(_) => StatusCode::NOT_FOUND,
                QueryError::NoNumericFields | QueryError::Invalid(_) => StatusCode::BAD_REQUEST,
                QueryError::Scan { .. } | QueryError::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Persistence(PersistenceError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            status = status.as_u16(),
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: self.to_string(),
            request_id,
        };

        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("valid token required".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(QueryError::UnknownMessageType("GPS".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(QueryError::NoNumericFields).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(UploadError::Invalid("upload_id required".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PayloadTooLarge(20).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_payload_too_large_message() {
        assert_eq!(
            ApiError::PayloadTooLarge(20).to_string(),
            "File too large. Maximum upload size is 20MB."
        );
    }

    #[test]
    fn test_response_is_not_cacheable() {
        let response = ApiError::NotFound("profile not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }
}
