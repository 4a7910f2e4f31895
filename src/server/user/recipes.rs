use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::engine::NewLabel;
use crate::server::AppState;
use crate::server::dto::{CreateRecipeRequest, PaginationParams, RenameLabelRequest};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, paginate,
};

pub async fn list_recipes(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");
    let recipes = state.engine.list_recipes(cursor, DEFAULT_PAGE_SIZE + 1)?;

    let (recipes, next_cursor, has_more) =
        paginate(recipes, DEFAULT_PAGE_SIZE as usize, |r| r.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(recipes, next_cursor, has_more)))
}

pub async fn create_recipe(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRecipeRequest>,
) -> impl IntoResponse {
    let recipe = state
        .engine
        .create_recipe(&auth.user.id, &req.name, req.labels)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(recipe))))
}

pub async fn get_recipe(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let recipe = state.engine.get_recipe(&id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(recipe)))
}

pub async fn add_label(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<NewLabel>,
) -> impl IntoResponse {
    let label = state.engine.add_label(&auth.user.id, &id, req)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(label))))
}

pub async fn rename_label(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RenameLabelRequest>,
) -> impl IntoResponse {
    let label = state.engine.rename_label(&auth.user.id, &id, &req.name)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(label)))
}

pub async fn remove_label(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.remove_label(&auth.user.id, &id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
