mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the document store interface.
///
/// Every method is a single blocking call. Methods that create records keyed
/// by a caller-generated id are idempotent where noted, so merge blocks can
/// be re-run after a partial failure.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Recipe operations
    fn create_recipe(&self, recipe: &Recipe) -> Result<()>;
    fn get_recipe(&self, id: &str) -> Result<Option<Recipe>>;
    fn list_recipes(&self, cursor: &str, limit: i32) -> Result<Vec<Recipe>>;
    fn is_recipe_bound(&self, recipe_id: &str) -> Result<bool>;
    fn create_label(&self, label: &Label) -> Result<()>;
    fn get_label(&self, id: &str) -> Result<Option<Label>>;
    fn list_labels(&self, recipe_id: &str) -> Result<Vec<Label>>;
    fn rename_label(&self, id: &str, name: &str) -> Result<()>;
    fn delete_label(&self, id: &str) -> Result<bool>;

    // Dataset operations
    fn create_dataset(&self, dataset: &Dataset) -> Result<()>;
    fn get_dataset(&self, id: &str) -> Result<Option<Dataset>>;
    /// Fetches every listed dataset in one query. Unknown ids are left out.
    fn get_datasets(&self, ids: &[String]) -> Result<Vec<Dataset>>;
    fn list_datasets(&self, cursor: &str, limit: i32) -> Result<Vec<Dataset>>;
    fn update_dataset(&self, dataset: &Dataset) -> Result<()>;
    fn list_owned_dataset_ids(&self, owner_id: &str) -> Result<Vec<String>>;
    /// Deletes the dataset and, by cascade, its assets, annotations, grants,
    /// pull requests and their staging rows.
    fn delete_dataset(&self, id: &str) -> Result<bool>;
    fn dataset_stats(&self, dataset_id: &str) -> Result<DatasetStats>;

    // Grant operations
    fn upsert_grant(&self, grant: &Grant) -> Result<()>;
    fn get_grant(&self, dataset_id: &str, user_id: &str) -> Result<Option<Grant>>;
    fn list_dataset_grants(&self, dataset_id: &str) -> Result<Vec<Grant>>;
    /// Grants held by one user across many datasets, in a single query.
    fn list_user_grants_for_datasets(
        &self,
        user_id: &str,
        dataset_ids: &[String],
    ) -> Result<Vec<Grant>>;
    fn delete_grant(&self, dataset_id: &str, user_id: &str) -> Result<bool>;

    // Asset operations
    /// Inserts the asset unless one with the same id exists. Returns true if inserted.
    fn create_asset(&self, asset: &Asset) -> Result<bool>;
    fn get_asset(&self, id: &str) -> Result<Option<Asset>>;
    fn list_dataset_assets(&self, dataset_id: &str, cursor: &str, limit: i32)
    -> Result<Vec<Asset>>;
    fn list_dataset_asset_ids(&self, dataset_id: &str) -> Result<Vec<String>>;
    /// Deletes the assets and, by cascade, their annotations. Missing ids are ignored.
    fn delete_assets(&self, ids: &[String]) -> Result<usize>;

    // Annotation operations
    /// Inserts the annotation unless one with the same id exists. Returns true if inserted.
    fn create_annotation(&self, annotation: &Annotation) -> Result<bool>;
    fn get_annotation(&self, id: &str) -> Result<Option<Annotation>>;
    fn list_asset_annotations(&self, asset_id: &str) -> Result<Vec<Annotation>>;
    fn update_annotation(&self, annotation: &Annotation) -> Result<()>;
    fn delete_annotation(&self, id: &str) -> Result<bool>;

    // Pull request operations
    fn create_pull_request(&self, pr: &PullRequest) -> Result<()>;
    fn get_pull_request(&self, id: &str) -> Result<Option<PullRequest>>;
    fn list_pull_requests(
        &self,
        dataset_id: &str,
        status: Option<PullRequestStatus>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<PullRequest>>;
    fn update_pull_request(&self, pr: &PullRequest) -> Result<()>;
    /// Deletes the pull request and, by cascade, its staging rows and messages.
    fn delete_pull_request(&self, id: &str) -> Result<bool>;
    fn pull_request_stats(&self, pull_request_id: &str) -> Result<PullRequestStats>;

    // Message operations
    fn create_message(&self, message: &PullRequestMessage) -> Result<()>;
    fn list_messages(&self, pull_request_id: &str) -> Result<Vec<PullRequestMessage>>;

    // Staged asset operations
    fn create_staged_asset(&self, staged: &StagedAsset) -> Result<()>;
    fn get_staged_asset(&self, id: &str) -> Result<Option<StagedAsset>>;
    fn list_staged_assets(&self, pull_request_id: &str) -> Result<Vec<StagedAsset>>;
    fn list_dataset_staged_asset_ids(&self, dataset_id: &str) -> Result<Vec<String>>;
    fn set_staged_asset_merged_id(&self, id: &str, merged_asset_id: &str) -> Result<()>;
    fn delete_staged_asset(&self, id: &str) -> Result<bool>;

    // Staged annotation operations
    fn create_staged_annotation(&self, staged: &StagedAnnotation) -> Result<()>;
    fn get_staged_annotation(&self, id: &str) -> Result<Option<StagedAnnotationRow>>;
    fn list_staged_annotations(&self, pull_request_id: &str) -> Result<Vec<StagedAnnotationRow>>;
    fn set_staged_annotation_merged_id(&self, id: &str, merged_annotation_id: &str) -> Result<()>;
    fn set_staged_annotation_old_value(&self, id: &str, old: &AnnotationValue) -> Result<()>;
    fn delete_staged_annotation(&self, id: &str) -> Result<bool>;

    // Staged asset deletion operations
    /// Queues the asset. Returns false if it was already queued.
    fn queue_asset_deletion(&self, deletion: &StagedAssetDeletion) -> Result<bool>;
    fn dequeue_asset_deletion(&self, pull_request_id: &str, asset_id: &str) -> Result<bool>;
    fn list_staged_asset_deletions(&self, pull_request_id: &str)
    -> Result<Vec<StagedAssetDeletion>>;

    fn close(&self) -> Result<()>;
}
