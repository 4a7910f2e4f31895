use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{MaybeUser, RequireUser};
use crate::server::AppState;
use crate::server::dto::{GrantRequest, RolesRequest};
use crate::server::response::{ApiError, ApiResponse};

pub async fn list_grants(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let grants = state.engine.list_permissions(&auth.user.id, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(grants)))
}

pub async fn assign_grant(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<GrantRequest>,
) -> impl IntoResponse {
    let grant = state
        .engine
        .assign_permission(&auth.user.id, &id, &req.user_id, req.role)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(grant)))
}

pub async fn revoke_grant(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .engine
        .revoke_permission(&auth.user.id, &id, &user_id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// Effective role on each requested dataset, keyed by dataset id.
pub async fn aggregate_roles(
    MaybeUser(user): MaybeUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RolesRequest>,
) -> impl IntoResponse {
    let actor = user.as_ref().map(|u| u.id.as_str());
    let roles = state.engine.aggregate_roles(actor, &req.dataset_ids)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(roles)))
}

/// Opens a purchase session for the billing integration to complete.
pub async fn begin_purchase(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let session = state.engine.begin_purchase(&auth.user.id, &id)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(session))))
}
