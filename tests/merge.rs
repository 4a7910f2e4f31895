//! Merge integration tests: end-to-end scenario, annotation accounting,
//! resumption after object store failures, and skipping of stale items.

mod common;

use std::sync::atomic::Ordering;

use common::{Fixture, bbox, image};
use datacollab::error::Error;
use datacollab::events::PROPOSAL_MERGED;
use datacollab::objects::ObjectStore;
use datacollab::store::Store;
use datacollab::types::{AnnotationValue, PullRequestStatus, Role, StageTarget};

#[tokio::test]
async fn test_merge_scenario() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, false, 0);

    let kept = f.upload(&owner, &dataset.id, "kept.png").await;
    let doomed = f.upload(&owner, &dataset.id, "doomed.png").await;
    let edited = f.annotate(&owner, &kept.id, &labels.bounding_box);
    f.annotate(&owner, &kept.id, &labels.bounding_box);
    f.annotate(&owner, &doomed.id, &labels.bounding_box);
    assert_eq!(f.annotation_count(&dataset.id), 3);

    let pr = f
        .engine
        .create_proposal(&owner, &dataset.id, "more cars", None)
        .unwrap();
    let staged = f
        .engine
        .stage_new_asset(&owner, &pr.id, image("new.png"))
        .await
        .unwrap();
    for _ in 0..2 {
        f.engine
            .stage_annotation(
                &owner,
                &pr.id,
                StageTarget::StagedAsset(staged.id.clone()),
                Some(bbox(&labels.bounding_box)),
            )
            .unwrap();
    }
    let replacement = AnnotationValue {
        label_id: labels.bounding_box.clone(),
        data: vec![0.5, 0.5, 0.2, 0.2],
        frame: None,
    };
    f.engine
        .stage_annotation(
            &owner,
            &pr.id,
            StageTarget::ExistingAnnotation(edited.clone()),
            Some(replacement.clone()),
        )
        .unwrap();
    f.engine
        .queue_asset_deletion(&owner, &pr.id, &doomed.id)
        .unwrap();

    let mut events = f.events.subscribe();
    let merged = f.engine.merge_proposal(&owner, &pr.id).await.unwrap();

    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert_eq!(merged.merge_progress, 4);
    assert!(merged.merged_at.is_some());
    assert_eq!(f.asset_count(&dataset.id), 3);
    assert_eq!(f.annotation_count(&dataset.id), 4);

    let annotation = f.store.get_annotation(&edited).unwrap().unwrap();
    assert_eq!(annotation.value, replacement);
    assert_eq!(annotation.old_annotation, Some(bbox(&labels.bounding_box)));

    assert!(f.store.get_asset(&doomed.id).unwrap().is_none());
    assert!(!f.objects.exists(&doomed.id).await.unwrap());

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, PROPOSAL_MERGED);
    assert_eq!(event.dataset_id, dataset.id);

    let again = f.engine.merge_proposal(&owner, &pr.id).await;
    assert!(matches!(again, Err(Error::InvalidOperation(_))));
}

#[tokio::test]
async fn test_merge_accounting() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, true, 0);

    let first = f.upload(&owner, &dataset.id, "first.png").await;
    let second = f.upload(&owner, &dataset.id, "second.png").await;
    let third = f.upload(&owner, &dataset.id, "third.png").await;
    let edited = f.annotate(&owner, &first.id, &labels.bounding_box);
    f.annotate(&owner, &first.id, &labels.bounding_box);
    let removed = f.annotate(&owner, &second.id, &labels.bounding_box);
    f.annotate(&owner, &third.id, &labels.bounding_box);
    f.annotate(&owner, &third.id, &labels.bounding_box);
    let pre = f.annotation_count(&dataset.id);

    let pr = f
        .engine
        .create_proposal(&owner, &dataset.id, "bulk", None)
        .unwrap();

    // N = 2 staged assets with A = 2 annotations each.
    for name in ["a.png", "b.png"] {
        let staged = f
            .engine
            .stage_new_asset(&owner, &pr.id, image(name))
            .await
            .unwrap();
        for _ in 0..2 {
            f.engine
                .stage_annotation(
                    &owner,
                    &pr.id,
                    StageTarget::StagedAsset(staged.id.clone()),
                    Some(bbox(&labels.bounding_box)),
                )
                .unwrap();
        }
    }
    // M = 2 new annotations on an existing asset.
    for _ in 0..2 {
        f.engine
            .stage_annotation(
                &owner,
                &pr.id,
                StageTarget::ExistingAsset(first.id.clone()),
                Some(bbox(&labels.bounding_box)),
            )
            .unwrap();
    }
    // One edit and one delete of existing annotations.
    f.engine
        .stage_annotation(
            &owner,
            &pr.id,
            StageTarget::ExistingAnnotation(edited),
            Some(bbox(&labels.bounding_box)),
        )
        .unwrap();
    f.engine
        .stage_annotation(&owner, &pr.id, StageTarget::ExistingAnnotation(removed), None)
        .unwrap();
    // One asset deletion carrying two annotations.
    f.engine
        .queue_asset_deletion(&owner, &pr.id, &third.id)
        .unwrap();

    let stats = f.engine.get_stats(&owner, &pr.id).unwrap();
    assert_eq!(stats.new_assets, 2);
    assert_eq!(stats.changed_assets, 2);
    assert_eq!(stats.deleted_assets, 1);

    f.engine.merge_proposal(&owner, &pr.id).await.unwrap();

    assert_eq!(f.annotation_count(&dataset.id), pre + 2 * 2 + 2 - 1 - 2);
    assert_eq!(f.asset_count(&dataset.id), 3 + 2 - 1);
}

#[tokio::test]
async fn test_merge_resumes_after_failed_deletion_block() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, false, 0);

    let existing = f.upload(&owner, &dataset.id, "existing.png").await;
    let doomed = f.upload(&owner, &dataset.id, "doomed.png").await;

    let pr = f
        .engine
        .create_proposal(&owner, &dataset.id, "swap", None)
        .unwrap();
    let staged = f
        .engine
        .stage_new_asset(&owner, &pr.id, image("new.png"))
        .await
        .unwrap();
    f.engine
        .stage_annotation(
            &owner,
            &pr.id,
            StageTarget::StagedAsset(staged.id.clone()),
            Some(bbox(&labels.bounding_box)),
        )
        .unwrap();
    f.engine
        .stage_annotation(
            &owner,
            &pr.id,
            StageTarget::ExistingAsset(existing.id.clone()),
            Some(bbox(&labels.bounding_box)),
        )
        .unwrap();
    f.engine
        .queue_asset_deletion(&owner, &pr.id, &doomed.id)
        .unwrap();

    f.objects.fail_deletes.store(true, Ordering::SeqCst);
    let failed = f.engine.merge_proposal(&owner, &pr.id).await;
    assert!(matches!(failed, Err(Error::ObjectStore(_))));

    let pr_after = f.store.get_pull_request(&pr.id).unwrap().unwrap();
    assert_eq!(pr_after.status, PullRequestStatus::Draft);
    assert_eq!(pr_after.merge_progress, 3);
    assert_eq!(f.asset_count(&dataset.id), 3);
    assert_eq!(f.annotation_count(&dataset.id), 2);

    f.objects.fail_deletes.store(false, Ordering::SeqCst);
    let merged = f.engine.merge_proposal(&owner, &pr.id).await.unwrap();
    assert_eq!(merged.status, PullRequestStatus::Merged);

    assert_eq!(f.asset_count(&dataset.id), 2);
    assert_eq!(f.annotation_count(&dataset.id), 2);

    let merged_asset_id = f.store.get_staged_asset(&staged.id).unwrap().unwrap().merged_asset_id;
    let merged_asset_id = merged_asset_id.expect("merged asset id recorded");
    let merged_asset = f.store.get_asset(&merged_asset_id).unwrap().unwrap();
    assert_eq!(merged_asset.dataset_id, dataset.id);
    assert_eq!(f.store.list_asset_annotations(&merged_asset_id).unwrap().len(), 1);
    assert_eq!(f.store.list_asset_annotations(&existing.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_partly_merged_pull_request_refuses_changes() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, false, 0);
    let kept = f.upload(&owner, &dataset.id, "kept.png").await;
    let doomed = f.upload(&owner, &dataset.id, "doomed.png").await;

    let pr = f
        .engine
        .create_proposal(&owner, &dataset.id, "cleanup", None)
        .unwrap();
    f.engine
        .queue_asset_deletion(&owner, &pr.id, &doomed.id)
        .unwrap();

    f.objects.fail_deletes.store(true, Ordering::SeqCst);
    assert!(f.engine.merge_proposal(&owner, &pr.id).await.is_err());
    let partial = f.store.get_pull_request(&pr.id).unwrap().unwrap();
    assert_eq!(partial.status, PullRequestStatus::Draft);
    assert_eq!(partial.merge_progress, 3);

    let in_progress = |result: Result<_, Error>| {
        matches!(result, Err(Error::InvalidOperation(m)) if m == "merge in progress")
    };

    assert!(in_progress(
        f.engine
            .stage_new_asset(&owner, &pr.id, image("late.png"))
            .await
            .map(|_| ())
    ));
    assert!(in_progress(
        f.engine
            .stage_annotation(
                &owner,
                &pr.id,
                StageTarget::ExistingAsset(kept.id.clone()),
                Some(bbox(&labels.bounding_box)),
            )
            .map(|_| ())
    ));
    assert!(in_progress(
        f.engine
            .queue_asset_deletion(&owner, &pr.id, &kept.id)
            .map(|_| ())
    ));
    assert!(in_progress(
        f.engine
            .dequeue_asset_deletion(&owner, &pr.id, &doomed.id)
            .map(|_| ())
    ));
    assert!(in_progress(
        f.engine
            .update_proposal(&owner, &pr.id, Some("renamed"), None)
            .map(|_| ())
    ));
    assert!(in_progress(
        f.engine
            .change_status(&owner, &pr.id, PullRequestStatus::Rejected)
            .map(|_| ())
    ));
    assert!(in_progress(f.engine.delete_proposal(&owner, &pr.id).await));

    // Nothing slipped in, so finishing the merge commits exactly what was staged.
    assert!(f.engine.list_staged_assets(&owner, &pr.id).unwrap().is_empty());
    f.objects.fail_deletes.store(false, Ordering::SeqCst);
    let merged = f.engine.merge_proposal(&owner, &pr.id).await.unwrap();
    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert_eq!(f.asset_count(&dataset.id), 1);
    assert!(f.store.get_asset(&kept.id).unwrap().is_some());
}

#[tokio::test]
async fn test_merge_retries_materialization_with_same_ids() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, false, 0);

    let pr = f
        .engine
        .create_proposal(&owner, &dataset.id, "new", None)
        .unwrap();
    let mut staged_ids = Vec::new();
    for name in ["a.png", "b.png", "c.png"] {
        let staged = f
            .engine
            .stage_new_asset(&owner, &pr.id, image(name))
            .await
            .unwrap();
        staged_ids.push(staged.id);
    }

    f.objects.fail_copies.store(true, Ordering::SeqCst);
    assert!(f.engine.merge_proposal(&owner, &pr.id).await.is_err());

    let pr_after = f.store.get_pull_request(&pr.id).unwrap().unwrap();
    assert_eq!(pr_after.merge_progress, 0);
    assert_eq!(f.asset_count(&dataset.id), 0);

    let first_ids: Vec<Option<String>> = staged_ids
        .iter()
        .map(|id| f.store.get_staged_asset(id).unwrap().unwrap().merged_asset_id)
        .collect();
    assert!(first_ids.iter().all(Option::is_some));

    f.objects.fail_copies.store(false, Ordering::SeqCst);
    f.engine.merge_proposal(&owner, &pr.id).await.unwrap();

    let second_ids: Vec<Option<String>> = staged_ids
        .iter()
        .map(|id| f.store.get_staged_asset(id).unwrap().unwrap().merged_asset_id)
        .collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(f.asset_count(&dataset.id), 3);

    for id in second_ids.into_iter().flatten() {
        assert!(f.objects.exists(&id).await.unwrap());
    }
}

#[tokio::test]
async fn test_merge_skips_items_whose_targets_vanished() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, false, 0);

    let asset = f.upload(&owner, &dataset.id, "a.png").await;
    let other = f.upload(&owner, &dataset.id, "b.png").await;
    let annotation = f.annotate(&owner, &other.id, &labels.bounding_box);

    let pr = f
        .engine
        .create_proposal(&owner, &dataset.id, "stale", None)
        .unwrap();
    f.engine
        .stage_annotation(
            &owner,
            &pr.id,
            StageTarget::ExistingAsset(asset.id.clone()),
            Some(bbox(&labels.bounding_box)),
        )
        .unwrap();
    f.engine
        .stage_annotation(
            &owner,
            &pr.id,
            StageTarget::ExistingAnnotation(annotation.clone()),
            Some(bbox(&labels.bounding_box)),
        )
        .unwrap();

    // Both targets disappear through direct edits before the merge.
    f.engine.delete_asset(&owner, &asset.id).await.unwrap();
    f.engine.delete_annotation(&owner, &annotation).unwrap();

    let merged = f.engine.merge_proposal(&owner, &pr.id).await.unwrap();
    assert_eq!(merged.status, PullRequestStatus::Merged);
    assert_eq!(f.asset_count(&dataset.id), 1);
    assert_eq!(f.annotation_count(&dataset.id), 0);
}

#[tokio::test]
async fn test_merge_requires_maintainer() {
    let f = Fixture::new();
    let owner = f.user("owner");
    let contributor = f.user("contributor");
    let labels = f.recipe();
    let dataset = f.dataset(&owner, &labels.recipe_id, false, 0);
    f.engine
        .assign_permission(&owner, &dataset.id, &contributor, Role::Contributor)
        .unwrap();

    let pr = f
        .engine
        .create_proposal(&contributor, &dataset.id, "mine", None)
        .unwrap();

    let result = f.engine.merge_proposal(&contributor, &pr.id).await;
    assert!(matches!(
        result,
        Err(Error::PermissionDenied {
            required: Role::Maintainer,
            actual: Role::Contributor,
        })
    ));

    let rejected = f
        .engine
        .change_status(&owner, &pr.id, PullRequestStatus::Rejected)
        .unwrap();
    assert_eq!(rejected.status, PullRequestStatus::Rejected);
    assert!(matches!(
        f.engine.merge_proposal(&owner, &pr.id).await,
        Err(Error::InvalidOperation(_))
    ));
}
