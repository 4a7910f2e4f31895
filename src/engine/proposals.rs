use chrono::Utc;
use uuid::Uuid;

use super::Engine;
use super::datasets::require_name;
use crate::error::{Error, Result};
use crate::objects::ObjectStore;
use crate::types::{Dataset, PullRequest, PullRequestMessage, PullRequestStatus, Role};

/// Fails unless the pull request can still change.
pub(crate) fn ensure_open(pr: &PullRequest) -> Result<()> {
    match pr.status {
        PullRequestStatus::Merged => Err(Error::invalid_operation("pull request already merged")),
        PullRequestStatus::Rejected => Err(Error::invalid_operation("pull request was rejected")),
        PullRequestStatus::Draft | PullRequestStatus::Published => Ok(()),
    }
}

/// Fails unless the pull request is open and no merge block has landed yet.
/// A partly merged pull request can only be finished by merging again.
pub(crate) fn ensure_editable(pr: &PullRequest) -> Result<()> {
    ensure_open(pr)?;
    if pr.merge_progress > 0 {
        return Err(Error::invalid_operation("merge in progress"));
    }
    Ok(())
}

/// Initiators write with contributor access; everyone else needs maintainer.
pub(crate) fn write_role(pr: &PullRequest, actor: &str) -> Role {
    if pr.user_id == actor {
        Role::Contributor
    } else {
        Role::Maintainer
    }
}

impl<O: ObjectStore> Engine<O> {
    /// Loads an open pull request and checks write access on it.
    pub(crate) fn writable_pull_request(&self, actor: &str, id: &str) -> Result<(PullRequest, Dataset)> {
        let pr = self.pull_request(id)?;
        let dataset = self.dataset(&pr.dataset_id)?;
        self.authorize(&dataset, Some(actor), write_role(&pr, actor))?;
        ensure_editable(&pr)?;
        Ok((pr, dataset))
    }

    /// Loads a pull request the actor can at least preview.
    pub(crate) fn readable_pull_request(&self, actor: &str, id: &str) -> Result<(PullRequest, Dataset)> {
        let pr = self.pull_request(id)?;
        let dataset = self.dataset(&pr.dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Preview)?;
        Ok((pr, dataset))
    }

    pub fn create_proposal(
        &self,
        actor: &str,
        dataset_id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<PullRequest> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Contributor)?;

        let now = Utc::now();
        let pr = PullRequest {
            id: Uuid::new_v4().to_string(),
            dataset_id: dataset.id,
            user_id: actor.to_string(),
            name: require_name("name", name)?,
            description,
            status: PullRequestStatus::Draft,
            merge_progress: 0,
            created_at: now,
            updated_at: now,
            merged_at: None,
        };
        self.store.create_pull_request(&pr)?;

        tracing::info!(pull_request_id = %pr.id, dataset_id = %pr.dataset_id, "created pull request");
        Ok(pr)
    }

    pub fn get_proposal(&self, actor: &str, id: &str) -> Result<PullRequest> {
        self.readable_pull_request(actor, id).map(|(pr, _)| pr)
    }

    pub fn list_proposals(
        &self,
        actor: &str,
        dataset_id: &str,
        status: Option<PullRequestStatus>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<PullRequest>> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Preview)?;
        self.store
            .list_pull_requests(&dataset.id, status, cursor, limit)
    }

    pub fn update_proposal(
        &self,
        actor: &str,
        id: &str,
        name: Option<&str>,
        description: Option<String>,
    ) -> Result<PullRequest> {
        let (mut pr, _) = self.writable_pull_request(actor, id)?;

        if let Some(name) = name {
            pr.name = require_name("name", name)?;
        }
        if let Some(description) = description {
            pr.description = Some(description).filter(|d| !d.is_empty());
        }
        pr.updated_at = Utc::now();

        self.store.update_pull_request(&pr)?;
        Ok(pr)
    }

    /// Deletes a pull request that has not been merged, with its staged
    /// rows, staged payloads, and messages. Sibling pull requests are untouched.
    pub async fn delete_proposal(&self, actor: &str, id: &str) -> Result<()> {
        let pr = self.pull_request(id)?;
        let dataset = self.dataset(&pr.dataset_id)?;
        self.authorize(&dataset, Some(actor), write_role(&pr, actor))?;

        if pr.status == PullRequestStatus::Merged {
            return Err(Error::invalid_operation("pull request already merged"));
        }
        if pr.merge_progress > 0 {
            return Err(Error::invalid_operation("merge in progress"));
        }

        let keys: Vec<String> = self
            .store
            .list_staged_assets(&pr.id)?
            .into_iter()
            .map(|s| s.id)
            .collect();

        self.store.delete_pull_request(&pr.id)?;
        tracing::info!(pull_request_id = %pr.id, payloads = keys.len(), "deleted pull request");

        self.objects.delete_many(&keys).await?;
        Ok(())
    }

    /// Moves between draft and published, or rejects. Merging goes through
    /// [`Engine::merge_proposal`].
    pub fn change_status(
        &self,
        actor: &str,
        id: &str,
        status: PullRequestStatus,
    ) -> Result<PullRequest> {
        let mut pr = self.pull_request(id)?;
        let dataset = self.dataset(&pr.dataset_id)?;

        let required = match status {
            PullRequestStatus::Draft | PullRequestStatus::Published => write_role(&pr, actor),
            PullRequestStatus::Rejected => Role::Maintainer,
            PullRequestStatus::Merged => {
                return Err(Error::invalid_operation(
                    "pull requests are merged through the merge operation",
                ));
            }
        };
        self.authorize(&dataset, Some(actor), required)?;
        ensure_editable(&pr)?;

        if pr.status != status {
            tracing::info!(pull_request_id = %pr.id, from = %pr.status, to = %status, "status change");
            pr.status = status;
            pr.updated_at = Utc::now();
            self.store.update_pull_request(&pr)?;
        }
        Ok(pr)
    }

    pub fn post_message(&self, actor: &str, id: &str, body: &str) -> Result<PullRequestMessage> {
        let (pr, _) = self.readable_pull_request(actor, id)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(Error::validation("body", "cannot be empty"));
        }

        let message = PullRequestMessage {
            id: Uuid::new_v4().to_string(),
            pull_request_id: pr.id,
            user_id: actor.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_message(&message)?;
        Ok(message)
    }

    pub fn list_messages(&self, actor: &str, id: &str) -> Result<Vec<PullRequestMessage>> {
        let (pr, _) = self.readable_pull_request(actor, id)?;
        self.store.list_messages(&pr.id)
    }
}
