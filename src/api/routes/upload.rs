//! Upload Routes
//!
//! - POST /upload_chunk - One chunk of a chunked upload
//! - POST /analyze - A whole log in one request

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::api::dto::{AnalyzeResponse, ChunkResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::upload::{ChunkOutcome, ChunkUpload, SingleUpload};

/// The `file` part of a multipart body
struct FilePart {
    filename: Option<String>,
    data: Vec<u8>,
}

/// A multipart body split into its file and text fields
#[derive(Default)]
struct UploadForm {
    file: Option<FilePart>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required<T: FromStr>(&self, key: &str) -> ApiResult<T> {
        let raw = self
            .text(key)
            .ok_or_else(|| ApiError::Validation(format!("{} required", key)))?;
        raw.parse()
            .map_err(|_| ApiError::Validation(format!("{} must be a non-negative integer", key)))
    }

    fn optional<T: FromStr>(&self, key: &str) -> ApiResult<Option<T>> {
        self.text(key)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ApiError::Validation(format!("{} must be a non-negative integer", key))
                })
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> bool {
        matches!(
            self.text(key).map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "1" | "yes")
        )
    }

    fn take_file(&mut self) -> ApiResult<FilePart> {
        self.file
            .take()
            .ok_or_else(|| ApiError::Validation("no file uploaded".to_string()))
    }
}

fn multipart_error(err: MultipartError, max_mb: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(max_mb)
    } else {
        ApiError::Validation(format!("invalid multipart body: {}", err.body_text()))
    }
}

async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
    max_mb: usize,
) -> ApiResult<UploadForm> {
    let mut multipart = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_mb))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(|e| multipart_error(e, max_mb))?;
            form.file = Some(FilePart {
                filename,
                data: data.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(|e| multipart_error(e, max_mb))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// POST /upload_chunk
///
/// Accepts one chunk. Answers with progress until the final chunk arrives,
/// then with the token and index of the reassembled log.
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ChunkResponse>> {
    let mut form = read_form(multipart, state.config.max_body_mb()).await?;
    let file = form.take_file()?;

    let chunk = ChunkUpload {
        upload_id: form.text("upload_id").unwrap_or_default().to_string(),
        chunk_index: form.required("chunk_index")?,
        total_chunks: form.required("total_chunks")?,
        original_filename: form
            .text("original_filename")
            .map(str::to_string)
            .or(file.filename),
        original_size: form.optional("original_size")?,
        total_size: form.optional("total_size")?,
        profile_id: form.text("profile_id").map(str::to_string),
        data: file.data,
    };

    tracing::debug!(
        upload_id = %chunk.upload_id,
        chunk_index = chunk.chunk_index,
        total_chunks = chunk.total_chunks,
        bytes = chunk.data.len(),
        "Chunk received"
    );

    let response = match state.assembler.receive_chunk(chunk).await? {
        ChunkOutcome::Progress {
            upload_id,
            received,
            total,
        } => ChunkResponse::ChunkReceived {
            upload_id,
            received,
            total,
        },
        ChunkOutcome::Complete(session) => ChunkResponse::Complete {
            token: session.token.clone(),
            analysis: session.index.clone(),
        },
    };

    Ok(Json(response))
}

/// POST /analyze
///
/// Analyzes a log sent in one request, gunzipping it first when the
/// `compressed` flag is set or the filename ends in `.gz`.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let mut form = read_form(multipart, state.config.max_body_mb()).await?;
    let file = form.take_file()?;

    let upload = SingleUpload {
        filename: file.filename.unwrap_or_default(),
        data: file.data,
        compressed: form.flag("compressed"),
        profile_id: form.text("profile_id").map(str::to_string),
    };

    let session = state.assembler.analyze_file(upload).await?;
    Ok(Json(AnalyzeResponse {
        token: session.token.clone(),
        analysis: session.index.clone(),
    }))
}
