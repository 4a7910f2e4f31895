use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{QueuedResponse, StageAnnotationRequest, UploadParams};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::stage_target;

use super::assets::new_asset;

pub async fn list_staged_assets(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let staged = state.engine.list_staged_assets(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(staged)))
}

pub async fn stage_asset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let staged = state
        .engine
        .stage_new_asset(&auth.user.id, &id, new_asset(&headers, params, body))
        .await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(staged))))
}

pub async fn unstage_asset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.unstage_asset(&auth.user.id, &id).await?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_staged_annotations(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let staged = state.engine.list_staged_annotations(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(staged)))
}

pub async fn stage_annotation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StageAnnotationRequest>,
) -> impl IntoResponse {
    let target = stage_target(&req)?;
    let staged = state
        .engine
        .stage_annotation(&auth.user.id, &id, target, req.value)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(staged))))
}

pub async fn unstage_annotation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.unstage_annotation(&auth.user.id, &id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_deletions(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let deletions = state
        .engine
        .list_staged_asset_deletions(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(deletions)))
}

pub async fn queue_deletion(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, asset_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let changed = state
        .engine
        .queue_asset_deletion(&auth.user.id, &id, &asset_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(QueuedResponse { changed })))
}

pub async fn dequeue_deletion(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, asset_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let changed = state
        .engine
        .dequeue_asset_deletion(&auth.user.id, &id, &asset_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(QueuedResponse { changed })))
}
