use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Engine;
use crate::access;
use crate::error::{Error, Result};
use crate::events::{DomainEvent, GRANT_CREATED, GRANT_PURCHASED};
use crate::objects::ObjectStore;
use crate::types::{Grant, Role};

/// Pending purchase handed to the billing collaborator. Completing it grants
/// contributor access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSession {
    pub dataset_id: String,
    pub user_id: String,
    /// Price in cents at the time the session was opened.
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

impl<O: ObjectStore> Engine<O> {
    /// Upserts the grant of `user_id` on the dataset. Requires admin.
    pub fn assign_permission(
        &self,
        actor: &str,
        dataset_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<Grant> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Admin)?;

        if role == Role::Owner {
            return Err(Error::validation("role", "ownership cannot be granted"));
        }
        if user_id == dataset.owner_id {
            return Err(Error::invalid_operation("the dataset owner's role cannot change"));
        }
        self.store.get_user(user_id)?.ok_or(Error::NotFound("user"))?;

        let now = Utc::now();
        let grant = match self.store.get_grant(&dataset.id, user_id)? {
            Some(existing) => Grant {
                role,
                updated_at: now,
                ..existing
            },
            None => Grant {
                dataset_id: dataset.id.clone(),
                user_id: user_id.to_string(),
                role,
                purchased: false,
                purchased_at: None,
                created_at: now,
                updated_at: now,
            },
        };
        self.store.upsert_grant(&grant)?;

        tracing::info!(dataset_id = %dataset.id, user_id, role = %role, "assigned role");
        self.events.publish(
            DomainEvent::new(GRANT_CREATED, &dataset.id)
                .with_actor(actor)
                .with_payload(json!({ "user_id": user_id, "role": role })),
        );
        Ok(grant)
    }

    pub fn revoke_permission(&self, actor: &str, dataset_id: &str, user_id: &str) -> Result<()> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Admin)?;

        if !self.store.delete_grant(&dataset.id, user_id)? {
            return Err(Error::NotFound("grant"));
        }
        tracing::info!(dataset_id = %dataset.id, user_id, "revoked role");
        Ok(())
    }

    pub fn list_permissions(&self, actor: &str, dataset_id: &str) -> Result<Vec<Grant>> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Admin)?;
        self.store.list_dataset_grants(&dataset.id)
    }

    /// Effective role of `actor` on each dataset. Unknown ids are skipped.
    pub fn aggregate_roles(
        &self,
        actor: Option<&str>,
        dataset_ids: &[String],
    ) -> Result<HashMap<String, Role>> {
        let datasets = self.store.get_datasets(dataset_ids)?;
        access::aggregate_roles(self.store.as_ref(), &datasets, actor)
    }

    /// Opens a purchase. Only offered when the actor holds no grant of any
    /// kind on a public paid dataset they do not own.
    pub fn begin_purchase(&self, actor: &str, dataset_id: &str) -> Result<PurchaseSession> {
        let dataset = self.dataset(dataset_id)?;
        let grant = self.store.get_grant(&dataset.id, actor)?;

        if !access::can_purchase(&dataset, actor, grant.as_ref()) {
            if !dataset.public && grant.as_ref().is_none_or(|g| g.role == Role::Blocked) {
                return Err(Error::NotFound("dataset"));
            }
            return Err(Error::invalid_operation("dataset is not available for purchase"));
        }

        Ok(PurchaseSession {
            dataset_id: dataset.id,
            user_id: actor.to_string(),
            price: dataset.price,
            created_at: Utc::now(),
        })
    }

    /// Records a paid purchase as a contributor grant.
    pub fn complete_purchase(&self, session: &PurchaseSession) -> Result<Grant> {
        let dataset = self.dataset(&session.dataset_id)?;
        let existing = self.store.get_grant(&dataset.id, &session.user_id)?;
        if !access::can_purchase(&dataset, &session.user_id, existing.as_ref()) {
            return Err(Error::invalid_operation("dataset is not available for purchase"));
        }

        let now = Utc::now();
        let grant = Grant {
            dataset_id: dataset.id.clone(),
            user_id: session.user_id.clone(),
            role: Role::Contributor,
            purchased: true,
            purchased_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_grant(&grant)?;

        tracing::info!(dataset_id = %dataset.id, user_id = %session.user_id, price = session.price, "purchase completed");
        self.events.publish(
            DomainEvent::new(GRANT_PURCHASED, &dataset.id)
                .with_actor(&session.user_id)
                .with_payload(json!({ "price": session.price })),
        );
        Ok(grant)
    }
}
