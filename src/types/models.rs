use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, Tool};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Allowed label set for datasets. Labels cannot be removed or renamed once
/// any dataset references the recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    /// Only the creator edits labels. Unset once the creator is deleted,
    /// which freezes the label set.
    pub creator_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub recipe_id: String,
    pub name: String,
    pub tool: Tool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub recipe_id: String,
    pub public: bool,
    /// Price in cents. Zero means free.
    pub price: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub dataset_id: String,
    pub user_id: String,
    pub role: Role,
    pub purchased: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Other,
}

impl AssetKind {
    #[must_use]
    pub fn from_mimetype(mimetype: &str) -> Self {
        match mimetype.split('/').next() {
            Some("image") => AssetKind::Image,
            Some("video") => AssetKind::Video,
            _ => AssetKind::Other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(AssetKind::Image),
            "video" => Some(AssetKind::Video),
            "other" => Some(AssetKind::Other),
            _ => None,
        }
    }
}

/// Base asset. Its payload lives in the object store under `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub dataset_id: String,
    pub kind: AssetKind,
    pub size: i64,
    pub display_name: String,
    pub mimetype: String,
    pub stage: String,
    pub created_at: DateTime<Utc>,
}

/// Label, shape data, and optional frame of an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationValue {
    pub label_id: String,
    pub data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub asset_id: String,
    #[serde(flatten)]
    pub value: AnnotationValue,
    /// Value before the last merge that altered this annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_annotation: Option<AnnotationValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestStatus {
    Draft,
    Published,
    Merged,
    Rejected,
}

impl PullRequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PullRequestStatus::Draft => "draft",
            PullRequestStatus::Published => "published",
            PullRequestStatus::Merged => "merged",
            PullRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PullRequestStatus::Draft),
            "published" => Some(PullRequestStatus::Published),
            "merged" => Some(PullRequestStatus::Merged),
            "rejected" => Some(PullRequestStatus::Rejected),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, PullRequestStatus::Merged | PullRequestStatus::Rejected)
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change proposal against one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: String,
    pub dataset_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: PullRequestStatus,
    /// Number of merge blocks durably completed (0..=4).
    pub merge_progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestMessage {
    pub id: String,
    pub pull_request_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A new asset proposed by a pull request. Payload key is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedAsset {
    pub id: String,
    pub pull_request_id: String,
    pub kind: AssetKind,
    pub size: i64,
    pub display_name: String,
    pub mimetype: String,
    /// Base asset id chosen on the first merge attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_asset_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a staged annotation change targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum StagedChange {
    /// New annotation on an asset staged by the same pull request.
    OnStagedAsset {
        staged_asset_id: String,
        value: AnnotationValue,
    },
    /// New annotation on an asset already in the dataset.
    OnExistingAsset {
        asset_id: String,
        value: AnnotationValue,
    },
    /// Edit of an existing annotation. No replacement means delete.
    OnExistingAnnotation {
        annotation_id: String,
        replacement: Option<AnnotationValue>,
    },
}

/// Target a caller names when staging an annotation change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageTarget {
    StagedAsset(String),
    ExistingAsset(String),
    ExistingAnnotation(String),
}

impl StagedChange {
    /// Builds a change for `target`. Asset targets require a value; an
    /// annotation target without one is a delete.
    pub fn new(target: StageTarget, value: Option<AnnotationValue>) -> Result<Self> {
        match (target, value) {
            (StageTarget::StagedAsset(staged_asset_id), Some(value)) => {
                Ok(StagedChange::OnStagedAsset {
                    staged_asset_id,
                    value,
                })
            }
            (StageTarget::ExistingAsset(asset_id), Some(value)) => {
                Ok(StagedChange::OnExistingAsset { asset_id, value })
            }
            (StageTarget::ExistingAnnotation(annotation_id), replacement) => {
                Ok(StagedChange::OnExistingAnnotation {
                    annotation_id,
                    replacement,
                })
            }
            (_, None) => Err(Error::validation(
                "data",
                "new annotations require a label and shape data",
            )),
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<&AnnotationValue> {
        match self {
            StagedChange::OnStagedAsset { value, .. }
            | StagedChange::OnExistingAsset { value, .. } => Some(value),
            StagedChange::OnExistingAnnotation { replacement, .. } => replacement.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedAnnotation {
    pub id: String,
    pub pull_request_id: String,
    pub change: StagedChange,
    /// Base value captured right before a merge overwrote or deleted it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_annotation: Option<AnnotationValue>,
    /// Base annotation id chosen on the first merge attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_annotation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persisted shape of a staged annotation: one nullable column per target.
#[derive(Debug, Clone)]
pub struct StagedAnnotationRow {
    pub id: String,
    pub pull_request_id: String,
    pub staged_asset_id: Option<String>,
    pub asset_id: Option<String>,
    pub annotation_id: Option<String>,
    pub value: Option<AnnotationValue>,
    pub old_annotation: Option<AnnotationValue>,
    pub merged_annotation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StagedAnnotationRow {
    #[must_use]
    pub fn from_staged(staged: &StagedAnnotation) -> Self {
        let (staged_asset_id, asset_id, annotation_id, value) = match &staged.change {
            StagedChange::OnStagedAsset {
                staged_asset_id,
                value,
            } => (Some(staged_asset_id.clone()), None, None, Some(value.clone())),
            StagedChange::OnExistingAsset { asset_id, value } => {
                (None, Some(asset_id.clone()), None, Some(value.clone()))
            }
            StagedChange::OnExistingAnnotation {
                annotation_id,
                replacement,
            } => (None, None, Some(annotation_id.clone()), replacement.clone()),
        };

        Self {
            id: staged.id.clone(),
            pull_request_id: staged.pull_request_id.clone(),
            staged_asset_id,
            asset_id,
            annotation_id,
            value,
            old_annotation: staged.old_annotation.clone(),
            merged_annotation_id: staged.merged_annotation_id.clone(),
            created_at: staged.created_at,
        }
    }

    /// Rebuilds the tagged change. Exactly one target must be set, and asset
    /// targets must carry a value.
    pub fn into_staged(self) -> Result<StagedAnnotation> {
        let change = match (self.staged_asset_id, self.asset_id, self.annotation_id) {
            (Some(staged_asset_id), None, None) => StagedChange::OnStagedAsset {
                staged_asset_id,
                value: self.value.ok_or_else(|| {
                    Error::ConflictDefect(format!("{}: staged asset target without data", self.id))
                })?,
            },
            (None, Some(asset_id), None) => StagedChange::OnExistingAsset {
                asset_id,
                value: self.value.ok_or_else(|| {
                    Error::ConflictDefect(format!("{}: asset target without data", self.id))
                })?,
            },
            (None, None, Some(annotation_id)) => StagedChange::OnExistingAnnotation {
                annotation_id,
                replacement: self.value,
            },
            (None, None, None) => {
                return Err(Error::ConflictDefect(format!("{}: no target", self.id)));
            }
            _ => {
                return Err(Error::ConflictDefect(format!(
                    "{}: more than one target",
                    self.id
                )));
            }
        };

        Ok(StagedAnnotation {
            id: self.id,
            pull_request_id: self.pull_request_id,
            change,
            old_annotation: self.old_annotation,
            merged_annotation_id: self.merged_annotation_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedAssetDeletion {
    pub pull_request_id: String,
    pub asset_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStats {
    pub new_assets: i64,
    pub changed_assets: i64,
    pub deleted_assets: i64,
    pub messages: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub assets: i64,
    pub annotations: i64,
    pub annotated_assets: i64,
    pub unannotated_assets: i64,
}
