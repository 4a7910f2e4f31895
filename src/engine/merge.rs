//! Four-block merge of a pull request into its dataset.
//!
//! Blocks run in order and `merge_progress` is persisted after each one, so a
//! failed merge resumes at the first incomplete block. Every identifier a
//! block writes is generated once and stored on the staged row before use,
//! which makes re-running a partially applied block insert nothing twice.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Engine;
use super::datasets::STAGE_MERGED;
use super::proposals::ensure_open;
use crate::error::{Error, Result};
use crate::events::{DomainEvent, PROPOSAL_MERGED};
use crate::objects::{ObjectStore, ObjectStoreError};
use crate::types::{
    Annotation, AnnotationValue, Asset, Dataset, PullRequest, PullRequestStatus, Role,
    StagedAnnotation, StagedAsset, StagedChange,
};

const MERGE_BLOCKS: u8 = 4;

fn report_defect(pr: &PullRequest, staged_id: &str, reason: impl Display) {
    let defect = Error::ConflictDefect(format!("{staged_id}: {reason}"));
    warn!(pull_request_id = %pr.id, "{defect}; skipping item");
}

async fn join_copy(tasks: &mut JoinSet<std::result::Result<(), ObjectStoreError>>) -> Result<()> {
    match tasks.join_next().await {
        Some(Ok(result)) => Ok(result?),
        Some(Err(e)) => Err(ObjectStoreError::Unavailable(format!("copy task failed: {e}")).into()),
        None => Ok(()),
    }
}

impl<O: ObjectStore> Engine<O> {
    /// Merges the pull request into its dataset. Requires maintainer.
    ///
    /// On failure the pull request stays unmerged with its progress marker at
    /// the last completed block; calling again resumes from there.
    pub async fn merge_proposal(&self, actor: &str, id: &str) -> Result<PullRequest> {
        let mut pr = self.pull_request(id)?;
        let dataset = self.dataset(&pr.dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Maintainer)?;
        ensure_open(&pr)?;

        info!(
            pull_request_id = %pr.id,
            dataset_id = %dataset.id,
            resume_at = pr.merge_progress + 1,
            "merging pull request"
        );

        let changes = self.load_staged_changes(&pr)?;

        while pr.merge_progress < MERGE_BLOCKS {
            let block = pr.merge_progress + 1;
            let result = match block {
                1 => self.materialize_staged_assets(&pr, &dataset, &changes).await,
                2 => self.annotate_existing_assets(&pr, &dataset, &changes),
                3 => self.apply_annotation_edits(&pr, &dataset, &changes),
                _ => self.apply_asset_deletions(&pr, &dataset).await,
            };
            if let Err(e) = result {
                error!(pull_request_id = %pr.id, block, "merge block failed: {e}");
                return Err(e);
            }

            pr.merge_progress = block;
            pr.updated_at = Utc::now();
            self.store.update_pull_request(&pr)?;
            debug!(pull_request_id = %pr.id, block, "merge block completed");
        }

        let stats = self.store.pull_request_stats(&pr.id)?;
        let now = Utc::now();
        pr.status = PullRequestStatus::Merged;
        pr.merged_at = Some(now);
        pr.updated_at = now;
        self.store.update_pull_request(&pr)?;

        info!(pull_request_id = %pr.id, dataset_id = %dataset.id, "pull request merged");
        self.events.publish(
            DomainEvent::new(PROPOSAL_MERGED, &dataset.id)
                .with_actor(actor)
                .with_payload(json!({ "pull_request_id": pr.id, "stats": stats })),
        );
        Ok(pr)
    }

    fn load_staged_changes(&self, pr: &PullRequest) -> Result<Vec<StagedAnnotation>> {
        Ok(self
            .store
            .list_staged_annotations(&pr.id)?
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                row.into_staged()
                    .map_err(|e| warn!(pull_request_id = %pr.id, staged_id = %id, "{e}; skipping item"))
                    .ok()
            })
            .collect())
    }

    /// Block 1: copy staged payloads to fresh asset ids, then create the
    /// assets and the annotations staged on them.
    async fn materialize_staged_assets(
        &self,
        pr: &PullRequest,
        dataset: &Dataset,
        changes: &[StagedAnnotation],
    ) -> Result<()> {
        let mut targets: Vec<(StagedAsset, String)> = Vec::new();
        for staged in self.store.list_staged_assets(&pr.id)? {
            let merged_id = match &staged.merged_asset_id {
                Some(id) => id.clone(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    self.store.set_staged_asset_merged_id(&staged.id, &id)?;
                    id
                }
            };
            targets.push((staged, merged_id));
        }

        let copies = targets
            .iter()
            .map(|(staged, merged_id)| (staged.id.clone(), merged_id.clone()))
            .collect();
        self.copy_payloads(copies).await?;

        let mut by_staged_asset: HashMap<&str, Vec<(&StagedAnnotation, &AnnotationValue)>> =
            HashMap::new();
        for change in changes {
            if let StagedChange::OnStagedAsset {
                staged_asset_id,
                value,
            } = &change.change
            {
                by_staged_asset
                    .entry(staged_asset_id.as_str())
                    .or_default()
                    .push((change, value));
            }
        }

        for (staged, merged_id) in &targets {
            let asset = Asset {
                id: merged_id.clone(),
                dataset_id: dataset.id.clone(),
                kind: staged.kind,
                size: staged.size,
                display_name: staged.display_name.clone(),
                mimetype: staged.mimetype.clone(),
                stage: STAGE_MERGED.to_string(),
                created_at: Utc::now(),
            };
            self.store.create_asset(&asset)?;

            for (change, value) in by_staged_asset.remove(staged.id.as_str()).unwrap_or_default() {
                if let Err(e) = self.validate_annotation(dataset, asset.kind, value) {
                    report_defect(pr, &change.id, e);
                    continue;
                }
                self.insert_merged_annotation(change, &asset.id, value)?;
            }
        }

        for (staged_asset_id, orphans) in by_staged_asset {
            for (change, _) in orphans {
                report_defect(pr, &change.id, format!("staged asset {staged_asset_id} is gone"));
            }
        }

        debug!(pull_request_id = %pr.id, assets = targets.len(), "materialized staged assets");
        Ok(())
    }

    async fn copy_payloads(&self, copies: Vec<(String, String)>) -> Result<()> {
        let limit = self.config.merge_concurrency.max(1);
        let mut tasks = JoinSet::new();

        for (src, dst) in copies {
            while tasks.len() >= limit {
                join_copy(&mut tasks).await?;
            }
            let objects = Arc::clone(&self.objects);
            tasks.spawn(async move { objects.copy(&src, &dst).await });
        }

        while !tasks.is_empty() {
            join_copy(&mut tasks).await?;
        }
        Ok(())
    }

    /// Block 2: new annotations on assets already in the dataset.
    fn annotate_existing_assets(
        &self,
        pr: &PullRequest,
        dataset: &Dataset,
        changes: &[StagedAnnotation],
    ) -> Result<()> {
        for change in changes {
            let StagedChange::OnExistingAsset { asset_id, value } = &change.change else {
                continue;
            };

            let Some(asset) = self
                .store
                .get_asset(asset_id)?
                .filter(|a| a.dataset_id == dataset.id)
            else {
                report_defect(pr, &change.id, format!("asset {asset_id} is not in the dataset"));
                continue;
            };

            if let Err(e) = self.validate_annotation(dataset, asset.kind, value) {
                report_defect(pr, &change.id, e);
                continue;
            }
            self.insert_merged_annotation(change, &asset.id, value)?;
        }
        Ok(())
    }

    /// Block 3: overwrite or delete existing annotations, keeping the prior
    /// value on the staged row and on the overwritten annotation.
    fn apply_annotation_edits(
        &self,
        pr: &PullRequest,
        dataset: &Dataset,
        changes: &[StagedAnnotation],
    ) -> Result<()> {
        for change in changes {
            let StagedChange::OnExistingAnnotation {
                annotation_id,
                replacement,
            } = &change.change
            else {
                continue;
            };

            let Some(mut annotation) = self.store.get_annotation(annotation_id)? else {
                if replacement.is_none() && change.old_annotation.is_some() {
                    debug!(pull_request_id = %pr.id, annotation_id, "annotation already deleted");
                } else {
                    report_defect(pr, &change.id, format!("annotation {annotation_id} is gone"));
                }
                continue;
            };

            let Some(asset) = self
                .store
                .get_asset(&annotation.asset_id)?
                .filter(|a| a.dataset_id == dataset.id)
            else {
                report_defect(pr, &change.id, format!("annotation {annotation_id} is not in the dataset"));
                continue;
            };

            if let Some(value) = replacement {
                if let Err(e) = self.validate_annotation(dataset, asset.kind, value) {
                    report_defect(pr, &change.id, e);
                    continue;
                }
            }

            let previous = match &change.old_annotation {
                Some(previous) => previous.clone(),
                None => {
                    self.store
                        .set_staged_annotation_old_value(&change.id, &annotation.value)?;
                    annotation.value.clone()
                }
            };

            match replacement {
                Some(value) => {
                    annotation.old_annotation = Some(previous);
                    annotation.value = value.clone();
                    annotation.updated_at = Utc::now();
                    self.store.update_annotation(&annotation)?;
                }
                None => {
                    self.store.delete_annotation(&annotation.id)?;
                }
            }
        }
        Ok(())
    }

    /// Block 4: reclaim payloads of queued assets, then delete the assets
    /// and, by cascade, their annotations.
    async fn apply_asset_deletions(&self, pr: &PullRequest, dataset: &Dataset) -> Result<()> {
        let mut ids = Vec::new();
        for deletion in self.store.list_staged_asset_deletions(&pr.id)? {
            match self.store.get_asset(&deletion.asset_id)? {
                Some(asset) if asset.dataset_id == dataset.id => ids.push(asset.id),
                Some(_) => report_defect(
                    pr,
                    &deletion.asset_id,
                    "queued asset belongs to another dataset",
                ),
                None => debug!(pull_request_id = %pr.id, asset_id = %deletion.asset_id, "asset already deleted"),
            }
        }

        if ids.is_empty() {
            return Ok(());
        }

        self.objects.delete_many(&ids).await?;
        let removed = self.store.delete_assets(&ids)?;
        debug!(pull_request_id = %pr.id, removed, "deleted queued assets");
        Ok(())
    }

    fn insert_merged_annotation(
        &self,
        change: &StagedAnnotation,
        asset_id: &str,
        value: &AnnotationValue,
    ) -> Result<()> {
        let id = match &change.merged_annotation_id {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                self.store.set_staged_annotation_merged_id(&change.id, &id)?;
                id
            }
        };

        let now = Utc::now();
        self.store.create_annotation(&Annotation {
            id,
            asset_id: asset_id.to_string(),
            value: value.clone(),
            old_annotation: None,
            created_at: now,
            updated_at: now,
        })?;
        Ok(())
    }
}
