use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
};

use crate::error::Error;
use crate::objects::ObjectStore;
use crate::server::AppState;
use crate::server::dto::SignedObjectParams;
use crate::server::response::ApiError;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub fn objects_router() -> Router<Arc<AppState>> {
    Router::new().route("/{key}", get(download_object))
}

/// Serves a payload to holders of a signed URL. No token is needed.
async fn download_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<SignedObjectParams>,
) -> impl IntoResponse {
    if !state
        .objects
        .verify_signature(&key, params.expires, &params.signature)
    {
        return Err(ApiError::forbidden("Invalid or expired signature"));
    }

    let data = state.objects.get(&key).await.map_err(Error::from)?;
    let content_type = state
        .objects
        .content_type(&key)
        .await
        .map_err(Error::from)?
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    Ok::<_, ApiError>(([(CONTENT_TYPE, content_type)], data))
}
