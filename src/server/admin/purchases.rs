use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::auth::RequireAdmin;
use crate::engine::PurchaseSession;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};

/// Called by the billing integration once a purchase session is paid.
pub async fn complete_purchase(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(session): Json<PurchaseSession>,
) -> impl IntoResponse {
    let grant = state.engine.complete_purchase(&session)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(grant))))
}
