use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{MaybeUser, RequireUser};
use crate::engine::{DatasetUpdate, NewDataset};
use crate::server::AppState;
use crate::server::dto::{DatasetResponse, PaginationParams};
use crate::server::response::{ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse};
use crate::types::Role;

/// Lists datasets the caller can preview. Anonymous callers see public ones.
pub async fn list_datasets(
    MaybeUser(user): MaybeUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let actor = user.as_ref().map(|u| u.id.as_str());
    let cursor = params.cursor.as_deref().unwrap_or("");

    let (datasets, next_cursor) = state
        .engine
        .list_datasets(actor, cursor, DEFAULT_PAGE_SIZE)?;

    let data: Vec<DatasetResponse> = datasets
        .into_iter()
        .map(|(dataset, role)| DatasetResponse { dataset, role })
        .collect();
    let has_more = next_cursor.is_some();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(data, next_cursor, has_more)))
}

pub async fn create_dataset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewDataset>,
) -> impl IntoResponse {
    let dataset = state.engine.create_dataset(&auth.user.id, req)?;
    let response = DatasetResponse {
        dataset,
        role: Role::Owner,
    };
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn get_dataset(
    MaybeUser(user): MaybeUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let actor = user.as_ref().map(|u| u.id.as_str());
    let (dataset, role) = state.engine.get_dataset(actor, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(DatasetResponse { dataset, role })))
}

pub async fn update_dataset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<DatasetUpdate>,
) -> impl IntoResponse {
    let dataset = state.engine.update_dataset(&auth.user.id, &id, req)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(dataset)))
}

pub async fn delete_dataset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.delete_dataset(&auth.user.id, &id).await?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn dataset_stats(
    MaybeUser(user): MaybeUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let actor = user.as_ref().map(|u| u.id.as_str());
    let stats = state.engine.dataset_stats(actor, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(stats)))
}
