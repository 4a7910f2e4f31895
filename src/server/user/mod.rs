mod assets;
mod datasets;
mod grants;
mod proposals;
mod recipes;
mod staging;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Recipes
        .route("/recipes", get(recipes::list_recipes))
        .route("/recipes", post(recipes::create_recipe))
        .route("/recipes/{id}", get(recipes::get_recipe))
        .route("/recipes/{id}/labels", post(recipes::add_label))
        .route("/labels/{id}", patch(recipes::rename_label))
        .route("/labels/{id}", delete(recipes::remove_label))
        // Datasets
        .route("/datasets", get(datasets::list_datasets))
        .route("/datasets", post(datasets::create_dataset))
        .route("/datasets/roles", post(grants::aggregate_roles))
        .route("/datasets/{id}", get(datasets::get_dataset))
        .route("/datasets/{id}", patch(datasets::update_dataset))
        .route("/datasets/{id}", delete(datasets::delete_dataset))
        .route("/datasets/{id}/stats", get(datasets::dataset_stats))
        // Grants and purchases
        .route("/datasets/{id}/grants", get(grants::list_grants))
        .route("/datasets/{id}/grants", put(grants::assign_grant))
        .route(
            "/datasets/{id}/grants/{user_id}",
            delete(grants::revoke_grant),
        )
        .route("/datasets/{id}/purchase", post(grants::begin_purchase))
        // Assets and annotations
        .route("/datasets/{id}/assets", get(assets::list_assets))
        .route("/datasets/{id}/assets", post(assets::upload_asset))
        .route("/assets/{id}", get(assets::get_asset))
        .route("/assets/{id}", delete(assets::delete_asset))
        .route("/assets/{id}/url", get(assets::asset_url))
        .route("/assets/{id}/annotations", get(assets::list_annotations))
        .route("/assets/{id}/annotations", post(assets::create_annotation))
        .route("/annotations/{id}", put(assets::update_annotation))
        .route("/annotations/{id}", delete(assets::delete_annotation))
        // Pull requests
        .route(
            "/datasets/{id}/pull-requests",
            get(proposals::list_pull_requests),
        )
        .route(
            "/datasets/{id}/pull-requests",
            post(proposals::create_pull_request),
        )
        .route("/pull-requests/{id}", get(proposals::get_pull_request))
        .route("/pull-requests/{id}", patch(proposals::update_pull_request))
        .route("/pull-requests/{id}", delete(proposals::delete_pull_request))
        .route("/pull-requests/{id}/status", post(proposals::change_status))
        .route("/pull-requests/{id}/merge", post(proposals::merge_pull_request))
        .route("/pull-requests/{id}/stats", get(proposals::pull_request_stats))
        .route("/pull-requests/{id}/messages", get(proposals::list_messages))
        .route("/pull-requests/{id}/messages", post(proposals::post_message))
        // Staging
        .route(
            "/pull-requests/{id}/staged-assets",
            get(staging::list_staged_assets),
        )
        .route(
            "/pull-requests/{id}/staged-assets",
            post(staging::stage_asset),
        )
        .route("/staged-assets/{id}", delete(staging::unstage_asset))
        .route(
            "/pull-requests/{id}/staged-annotations",
            get(staging::list_staged_annotations),
        )
        .route(
            "/pull-requests/{id}/staged-annotations",
            post(staging::stage_annotation),
        )
        .route(
            "/staged-annotations/{id}",
            delete(staging::unstage_annotation),
        )
        .route(
            "/pull-requests/{id}/deletions",
            get(staging::list_deletions),
        )
        .route(
            "/pull-requests/{id}/deletions/{asset_id}",
            put(staging::queue_deletion),
        )
        .route(
            "/pull-requests/{id}/deletions/{asset_id}",
            delete(staging::dequeue_deletion),
        )
}
