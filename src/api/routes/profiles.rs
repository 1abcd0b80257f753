//! Profile Routes
//!
//! - POST /profiles, GET /profiles?user_id= - Create and list profiles
//! - GET /profiles/:id, DELETE /profiles/:id - Fetch or cascade delete
//! - GET /profiles/:id/analyses - Analyses saved under a profile
//! - POST /profiles/:id/graphs, GET /profiles/:id/graphs - Saved graphs
//! - DELETE /graphs/:id - Delete one saved graph
//! - GET /analyses/:token - Saved analysis for a session token

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    AnalysesResponse, DeletedResponse, GraphsResponse, ProfileListParams, ProfilesResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::persistence::{AnalysisRecord, NewGraph, NewProfile, Profile, SavedGraph};

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

async fn require_profile(state: &AppState, id: &str) -> ApiResult<Profile> {
    state
        .profiles
        .get_profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {} not found", id)))
}

/// POST /profiles
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewProfile>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Profile>)> {
    let profile = state.profiles.create_profile(json_body(body)?).await?;
    tracing::info!(profile_id = %profile.id, name = %profile.name, "Profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /profiles
pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProfileListParams>,
) -> ApiResult<Json<ProfilesResponse>> {
    let user_id = params.user_id.as_deref().filter(|u| !u.is_empty());
    let profiles = state.profiles.list_profiles(user_id).await?;
    Ok(Json(ProfilesResponse { profiles }))
}

/// GET /profiles/:id
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Profile>> {
    Ok(Json(require_profile(&state, &id).await?))
}

/// DELETE /profiles/:id
///
/// Also removes the profile's saved analyses and graphs.
pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    if !state.profiles.delete_profile(&id).await? {
        return Err(ApiError::NotFound(format!("profile {} not found", id)));
    }
    tracing::info!(profile_id = %id, "Profile deleted");
    Ok(Json(DeletedResponse { deleted: true }))
}

/// GET /profiles/:id/analyses
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysesResponse>> {
    require_profile(&state, &id).await?;
    let analyses = state.profiles.get_analysis_results(&id).await?;
    Ok(Json(AnalysesResponse { analyses }))
}

/// POST /profiles/:id/graphs
pub async fn save_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<NewGraph>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SavedGraph>)> {
    require_profile(&state, &id).await?;
    let mut graph = json_body(body)?;
    graph.profile_id = id;
    let graph = state.profiles.save_graph(graph).await?;
    Ok((StatusCode::CREATED, Json(graph)))
}

/// GET /profiles/:id/graphs
pub async fn list_graphs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<GraphsResponse>> {
    require_profile(&state, &id).await?;
    let graphs = state.profiles.get_saved_graphs(&id).await?;
    Ok(Json(GraphsResponse { graphs }))
}

/// DELETE /graphs/:id
pub async fn delete_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    if !state.profiles.delete_saved_graph(&id).await? {
        return Err(ApiError::NotFound(format!("graph {} not found", id)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

/// GET /analyses/:token
pub async fn analysis_by_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<AnalysisRecord>> {
    state
        .profiles
        .get_analysis_by_token(&token)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no saved analysis for token {}", token)))
}
