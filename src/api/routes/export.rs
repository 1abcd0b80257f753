//! Export Routes
//!
//! - GET /download - One message type as a CSV attachment

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::dto::DownloadParams;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::upload::sanitize_filename;

/// GET /download?token&msg
///
/// Columns are `_time` followed by every numeric field the index recorded
/// for the type.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let session = state.session(params.token.as_deref()).await?;
    let msg = params
        .msg
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::Validation("msg param required".to_string()))?;

    let m = msg.clone();
    let csv = state
        .query(session, move |engine, session| engine.export_csv(session, &m))
        .await?;

    let disposition = format!("attachment; filename=\"{}.csv\"", sanitize_filename(&msg));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}
