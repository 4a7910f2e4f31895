use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::objects::objects_router;
use super::user::user_router;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::events::EventBus;
use crate::objects::FsObjectStore;
use crate::store::Store;

/// Largest accepted request body. Asset uploads are sent whole.
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub objects: Arc<FsObjectStore>,
    pub engine: Engine<FsObjectStore>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<FsObjectStore>,
        events: Arc<EventBus>,
        config: ServerConfig,
    ) -> Self {
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::clone(&objects),
            events,
            config.engine_config(),
        );
        Self {
            store,
            objects,
            engine,
            config,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .nest("/objects", objects_router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
