use serde::{Deserialize, Serialize};

use crate::engine::NewLabel;
use crate::types::{AnnotationValue, Dataset, Role, Token, User};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: User,
    /// Raw token. Only returned once.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: Token,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecipeRequest {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<NewLabel>,
}

#[derive(Debug, Deserialize)]
pub struct RenameLabelRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct DatasetResponse {
    #[serde(flatten)]
    pub dataset: Dataset,
    /// Effective role of the caller.
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RolesRequest {
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedObjectParams {
    pub expires: i64,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePullRequestRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPullRequestsParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub body: String,
}

/// Exactly one of the three target ids must be set. Omitting `value` on an
/// annotation target stages a delete.
#[derive(Debug, Deserialize)]
pub struct StageAnnotationRequest {
    #[serde(default)]
    pub staged_asset_id: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub annotation_id: Option<String>,
    #[serde(default)]
    pub value: Option<AnnotationValue>,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    /// False when the request changed nothing.
    pub changed: bool,
}
