//! Query Routes
//!
//! Read-only views of an analyzed log, addressed by session token.
//!
//! - GET /timeseries - One field of one message type
//! - GET /stats - Record totals and time span
//! - GET /params - Final parameter table
//! - GET /dump - First N raw records of a type
//! - GET /flight_modes - Mode segments from the index
//! - GET /messages - Message types and their numeric fields

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    DumpParams, DumpResponse, FlightModesResponse, MessagesResponse, ParamsResponse,
    TimeseriesParams, TimeseriesResponse, TokenParams,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::LogStats;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// GET /timeseries?token&msg&field&decimate
pub async fn timeseries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeseriesParams>,
) -> ApiResult<Json<TimeseriesResponse>> {
    let session = state.session(params.token.as_deref()).await?;
    let decimate = params.decimate()?;
    let (Some(msg), Some(field)) = (non_empty(params.msg), non_empty(params.field)) else {
        return Err(ApiError::Validation("msg and field required".to_string()));
    };

    let (m, f) = (msg.clone(), field.clone());
    let series = state
        .query(session, move |engine, session| {
            engine.timeseries(session, &m, &f, decimate)
        })
        .await?;

    Ok(Json(TimeseriesResponse { msg, field, series }))
}

/// GET /stats?token
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TokenParams>,
) -> ApiResult<Json<LogStats>> {
    let session = state.session(params.token.as_deref()).await?;
    let stats = state
        .query(session, |engine, session| engine.stats(session))
        .await?;
    Ok(Json(stats))
}

/// GET /params?token
pub async fn params(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TokenParams>,
) -> ApiResult<Json<ParamsResponse>> {
    let session = state.session(params.token.as_deref()).await?;
    let params = state
        .query(session, |engine, session| engine.params(session))
        .await?;
    Ok(Json(ParamsResponse {
        count: params.len(),
        params,
    }))
}

/// GET /dump?token&type&limit
pub async fn dump(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DumpParams>,
) -> ApiResult<Json<DumpResponse>> {
    let session = state.session(params.token.as_deref()).await?;
    let limit = params.limit()?;
    let msg_type = non_empty(params.msg_type)
        .ok_or_else(|| ApiError::Validation("type param required".to_string()))?;

    let t = msg_type.clone();
    let messages = state
        .query(session, move |engine, session| engine.dump(session, &t, limit))
        .await?;

    Ok(Json(DumpResponse {
        msg_type,
        count: messages.len(),
        messages,
    }))
}

/// GET /flight_modes?token
pub async fn flight_modes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TokenParams>,
) -> ApiResult<Json<FlightModesResponse>> {
    let session = state.session(params.token.as_deref()).await?;
    Ok(Json(FlightModesResponse {
        modes: state.engine.flight_modes(&session),
    }))
}

/// GET /messages?token
pub async fn messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TokenParams>,
) -> ApiResult<Json<MessagesResponse>> {
    let session = state.session(params.token.as_deref()).await?;
    Ok(Json(MessagesResponse {
        messages: session.index.messages.clone(),
    }))
}
