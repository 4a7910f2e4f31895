use crate::server::dto::StageAnnotationRequest;
use crate::server::response::ApiError;
use crate::types::{PullRequestStatus, StageTarget};

const MAX_USER_NAME_LEN: usize = 64;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

pub fn validate_user_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("User name cannot be empty".to_string());
    }
    if name.len() > MAX_USER_NAME_LEN {
        return Err(format!(
            "User name cannot exceed {MAX_USER_NAME_LEN} characters"
        ));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(
            "User name can only contain alphanumeric characters, hyphens, underscores, and periods"
                .to_string(),
        );
    }
    if name.starts_with('-') || name.starts_with('.') {
        return Err("User name cannot start with a hyphen or period".to_string());
    }
    Ok(())
}

pub fn parse_status(status: &str) -> Result<PullRequestStatus, ApiError> {
    PullRequestStatus::parse(status)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown pull request status: {status}")))
}

/// Picks the single target named by a staging request.
pub fn stage_target(req: &StageAnnotationRequest) -> Result<StageTarget, ApiError> {
    match (&req.staged_asset_id, &req.asset_id, &req.annotation_id) {
        (Some(id), None, None) => Ok(StageTarget::StagedAsset(id.clone())),
        (None, Some(id), None) => Ok(StageTarget::ExistingAsset(id.clone())),
        (None, None, Some(id)) => Ok(StageTarget::ExistingAnnotation(id.clone())),
        _ => Err(ApiError::bad_request(
            "Exactly one of staged_asset_id, asset_id, or annotation_id is required",
        )),
    }
}
