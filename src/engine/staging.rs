use chrono::Utc;
use uuid::Uuid;

use super::datasets::{NewAsset, require_name};
use super::Engine;
use crate::error::{Error, Result};
use crate::objects::ObjectStore;
use crate::types::{
    AnnotationValue, AssetKind, Dataset, PullRequest, StageTarget, StagedAnnotation, StagedAsset,
    StagedAssetDeletion, StagedChange,
};

impl<O: ObjectStore> Engine<O> {
    /// Stages a new asset. The payload is stored under the staged id before
    /// the record exists.
    pub async fn stage_new_asset(
        &self,
        actor: &str,
        pull_request_id: &str,
        new: NewAsset,
    ) -> Result<StagedAsset> {
        let (pr, _) = self.writable_pull_request(actor, pull_request_id)?;

        let staged = StagedAsset {
            id: Uuid::new_v4().to_string(),
            pull_request_id: pr.id,
            kind: AssetKind::from_mimetype(&new.mimetype),
            size: new.data.len() as i64,
            display_name: require_name("display_name", &new.display_name)?,
            mimetype: new.mimetype,
            merged_asset_id: None,
            created_at: Utc::now(),
        };

        self.objects.put(&staged.id, new.data, &staged.mimetype).await?;
        self.store.create_staged_asset(&staged)?;

        tracing::debug!(pull_request_id = %staged.pull_request_id, staged_asset_id = %staged.id, "staged asset");
        Ok(staged)
    }

    /// Removes a staged asset together with the annotations staged on it.
    pub async fn unstage_asset(&self, actor: &str, staged_asset_id: &str) -> Result<()> {
        let staged = self
            .store
            .get_staged_asset(staged_asset_id)?
            .ok_or(Error::NotFound("staged asset"))?;
        self.writable_pull_request(actor, &staged.pull_request_id)?;

        self.store.delete_staged_asset(&staged.id)?;
        self.objects.delete_many(&[staged.id]).await?;
        Ok(())
    }

    pub fn list_staged_assets(&self, actor: &str, pull_request_id: &str) -> Result<Vec<StagedAsset>> {
        let (pr, _) = self.readable_pull_request(actor, pull_request_id)?;
        self.store.list_staged_assets(&pr.id)
    }

    /// Stages an annotation change. The target must belong to this pull
    /// request or its dataset, and any value is validated against the recipe
    /// now so merges never see malformed data.
    pub fn stage_annotation(
        &self,
        actor: &str,
        pull_request_id: &str,
        target: StageTarget,
        value: Option<AnnotationValue>,
    ) -> Result<StagedAnnotation> {
        let (pr, dataset) = self.writable_pull_request(actor, pull_request_id)?;

        let change = StagedChange::new(target, value)?;
        let kind = self.target_kind(&pr, &dataset, &change)?;
        if let Some(value) = change.value() {
            self.validate_annotation(&dataset, kind, value)?;
        }

        let staged = StagedAnnotation {
            id: Uuid::new_v4().to_string(),
            pull_request_id: pr.id,
            change,
            old_annotation: None,
            merged_annotation_id: None,
            created_at: Utc::now(),
        };
        self.store.create_staged_annotation(&staged)?;
        Ok(staged)
    }

    /// Resolves the asset kind behind a change, checking the target is in scope.
    fn target_kind(&self, pr: &PullRequest, dataset: &Dataset, change: &StagedChange) -> Result<AssetKind> {
        match change {
            StagedChange::OnStagedAsset {
                staged_asset_id, ..
            } => self
                .store
                .get_staged_asset(staged_asset_id)?
                .filter(|s| s.pull_request_id == pr.id)
                .map(|s| s.kind)
                .ok_or(Error::NotFound("staged asset")),
            StagedChange::OnExistingAsset { asset_id, .. } => self
                .store
                .get_asset(asset_id)?
                .filter(|a| a.dataset_id == dataset.id)
                .map(|a| a.kind)
                .ok_or(Error::NotFound("asset")),
            StagedChange::OnExistingAnnotation { annotation_id, .. } => {
                let annotation = self
                    .store
                    .get_annotation(annotation_id)?
                    .ok_or(Error::NotFound("annotation"))?;
                self.store
                    .get_asset(&annotation.asset_id)?
                    .filter(|a| a.dataset_id == dataset.id)
                    .map(|a| a.kind)
                    .ok_or(Error::NotFound("annotation"))
            }
        }
    }

    pub fn unstage_annotation(&self, actor: &str, staged_annotation_id: &str) -> Result<()> {
        let row = self
            .store
            .get_staged_annotation(staged_annotation_id)?
            .ok_or(Error::NotFound("staged annotation"))?;
        self.writable_pull_request(actor, &row.pull_request_id)?;
        self.store.delete_staged_annotation(&row.id)?;
        Ok(())
    }

    /// Lists staged annotation changes. Rows in an impossible state are
    /// logged and left out.
    pub fn list_staged_annotations(
        &self,
        actor: &str,
        pull_request_id: &str,
    ) -> Result<Vec<StagedAnnotation>> {
        let (pr, _) = self.readable_pull_request(actor, pull_request_id)?;
        Ok(self
            .store
            .list_staged_annotations(&pr.id)?
            .into_iter()
            .filter_map(|row| match row.into_staged() {
                Ok(staged) => Some(staged),
                Err(e) => {
                    tracing::warn!(pull_request_id = %pr.id, "skipping staged annotation: {e}");
                    None
                }
            })
            .collect())
    }

    /// Queues an existing asset for deletion. Returns false if already queued.
    pub fn queue_asset_deletion(&self, actor: &str, pull_request_id: &str, asset_id: &str) -> Result<bool> {
        let (pr, dataset) = self.writable_pull_request(actor, pull_request_id)?;
        self.store
            .get_asset(asset_id)?
            .filter(|a| a.dataset_id == dataset.id)
            .ok_or(Error::NotFound("asset"))?;

        self.store.queue_asset_deletion(&StagedAssetDeletion {
            pull_request_id: pr.id,
            asset_id: asset_id.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Returns false if the asset was not queued.
    pub fn dequeue_asset_deletion(&self, actor: &str, pull_request_id: &str, asset_id: &str) -> Result<bool> {
        let (pr, _) = self.writable_pull_request(actor, pull_request_id)?;
        self.store.dequeue_asset_deletion(&pr.id, asset_id)
    }

    pub fn list_staged_asset_deletions(
        &self,
        actor: &str,
        pull_request_id: &str,
    ) -> Result<Vec<StagedAssetDeletion>> {
        let (pr, _) = self.readable_pull_request(actor, pull_request_id)?;
        self.store.list_staged_asset_deletions(&pr.id)
    }
}
