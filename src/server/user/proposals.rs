use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    CreatePullRequestRequest, ListPullRequestsParams, MessageRequest, StatusRequest,
    UpdatePullRequestRequest,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, paginate,
};
use crate::server::validation::parse_status;

pub async fn list_pull_requests(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ListPullRequestsParams>,
) -> impl IntoResponse {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let cursor = params.cursor.as_deref().unwrap_or("");

    let prs = state.engine.list_proposals(
        &auth.user.id,
        &id,
        status,
        cursor,
        DEFAULT_PAGE_SIZE + 1,
    )?;

    let (prs, next_cursor, has_more) = paginate(prs, DEFAULT_PAGE_SIZE as usize, |p| p.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(prs, next_cursor, has_more)))
}

pub async fn create_pull_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreatePullRequestRequest>,
) -> impl IntoResponse {
    let pr = state
        .engine
        .create_proposal(&auth.user.id, &id, &req.name, req.description)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(pr))))
}

pub async fn get_pull_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let pr = state.engine.get_proposal(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(pr)))
}

pub async fn update_pull_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePullRequestRequest>,
) -> impl IntoResponse {
    let pr = state.engine.update_proposal(
        &auth.user.id,
        &id,
        req.name.as_deref(),
        req.description,
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(pr)))
}

pub async fn delete_pull_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.engine.delete_proposal(&auth.user.id, &id).await?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn change_status(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> impl IntoResponse {
    let status = parse_status(&req.status)?;
    let pr = state.engine.change_status(&auth.user.id, &id, status)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(pr)))
}

pub async fn merge_pull_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let pr = state.engine.merge_proposal(&auth.user.id, &id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(pr)))
}

pub async fn pull_request_stats(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let stats = state.engine.get_stats(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(stats)))
}

pub async fn list_messages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let messages = state.engine.list_messages(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(messages)))
}

pub async fn post_message(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    let message = state.engine.post_message(&auth.user.id, &id, &req.body)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(message))))
}
