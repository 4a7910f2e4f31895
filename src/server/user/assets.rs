use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::engine::NewAsset;
use crate::server::AppState;
use crate::server::dto::{PaginationParams, UploadParams, UrlResponse};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, paginate,
};
use crate::types::AnnotationValue;

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Builds an upload from a raw request body. The mimetype comes from the
/// `Content-Type` header.
pub(super) fn new_asset(headers: &HeaderMap, params: UploadParams, body: Bytes) -> NewAsset {
    let mimetype = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_MIMETYPE)
        .to_string();

    NewAsset {
        display_name: params.name,
        mimetype,
        data: body,
    }
}

pub async fn list_assets(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");
    let assets = state
        .engine
        .list_assets(&auth.user.id, &id, cursor, DEFAULT_PAGE_SIZE + 1)?;

    let (assets, next_cursor, has_more) =
        paginate(assets, DEFAULT_PAGE_SIZE as usize, |a| a.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(assets, next_cursor, has_more)))
}

pub async fn upload_asset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let asset = state
        .engine
        .upload_asset(&auth.user.id, &id, new_asset(&headers, params, body))
        .await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(asset))))
}

pub async fn get_asset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let asset = state.engine.get_asset(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(asset)))
}

pub async fn delete_asset(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.delete_asset(&auth.user.id, &id).await?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn asset_url(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let url = state.engine.asset_url(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(UrlResponse { url })))
}

pub async fn list_annotations(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let annotations = state.engine.list_annotations(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(annotations)))
}

pub async fn create_annotation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AnnotationValue>,
) -> impl IntoResponse {
    let annotation = state.engine.create_annotation(&auth.user.id, &id, req)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(annotation))))
}

pub async fn update_annotation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AnnotationValue>,
) -> impl IntoResponse {
    let annotation = state.engine.update_annotation(&auth.user.id, &id, req)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(annotation)))
}

pub async fn delete_annotation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.delete_annotation(&auth.user.id, &id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
