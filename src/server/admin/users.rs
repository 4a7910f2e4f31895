use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireAdmin, TokenGenerator, issue_token};
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    CreateTokenResponse, CreateUserRequest, CreateUserResponse, PaginationParams,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, paginate,
};
use crate::server::validation::validate_user_name;
use crate::types::User;

/// Creates a user and its first token.
pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    validate_user_name(&req.name).map_err(ApiError::bad_request)?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        created_at: Utc::now(),
    };

    state.store.create_user(&user).map_err(|e| match e {
        Error::AlreadyExists => ApiError::conflict("User name already taken"),
        e => ApiError::from(e),
    })?;

    let (_, token) = issue_token(
        state.store.as_ref(),
        &TokenGenerator::new(),
        false,
        Some(user.id.clone()),
    )?;

    tracing::info!(user_id = %user.id, name = %user.name, "created user");
    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateUserResponse { user, token })),
    ))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let users = state.store.list_users(cursor, DEFAULT_PAGE_SIZE + 1)?;

    let (users, next_cursor, has_more) =
        paginate(users, DEFAULT_PAGE_SIZE as usize, |u| u.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, next_cursor, has_more)))
}

fn find_user(state: &AppState, id: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = find_user(&state, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// Deletes the user's datasets (payloads included), then the user with
/// their tokens and grants.
pub async fn delete_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = find_user(&state, &id)?;

    for dataset_id in state.store.list_owned_dataset_ids(&user.id)? {
        state.engine.delete_dataset(&user.id, &dataset_id).await?;
    }
    state.store.delete_user(&user.id)?;
    tracing::info!(user_id = %user.id, "deleted user");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_user_tokens(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = find_user(&state, &id)?;
    let tokens = state.store.list_user_tokens(&user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tokens)))
}

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = find_user(&state, &id)?;
    let (metadata, token) = issue_token(
        state.store.as_ref(),
        &TokenGenerator::new(),
        false,
        Some(user.id),
    )?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateTokenResponse { token, metadata })),
    ))
}
