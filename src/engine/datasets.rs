use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Engine;
use crate::access;
use crate::error::{Error, Result};
use crate::objects::ObjectStore;
use crate::types::{
    Annotation, AnnotationValue, Asset, AssetKind, Dataset, Label, Recipe, Role, Tool,
};

const MAX_NAME_LEN: usize = 100;

/// Stage recorded on assets uploaded directly into a dataset.
pub const STAGE_UPLOADED: &str = "uploaded";
/// Stage recorded on assets materialized by a merge.
pub const STAGE_MERGED: &str = "merged";

#[derive(Debug, Clone, Deserialize)]
pub struct NewLabel {
    pub name: String,
    pub tool: Tool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeWithLabels {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDataset {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub recipe_id: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub price: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
    pub price: Option<i64>,
}

/// An uploaded payload with its metadata.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub display_name: String,
    pub mimetype: String,
    pub data: Bytes,
}

pub(crate) fn require_name(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "cannot be empty"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::validation(
            field,
            format!("cannot exceed {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn require_price(price: i64) -> Result<i64> {
    if price < 0 {
        return Err(Error::validation("price", "cannot be negative"));
    }
    Ok(price)
}

impl<O: ObjectStore> Engine<O> {
    // Recipes

    pub fn create_recipe(
        &self,
        actor: &str,
        name: &str,
        labels: Vec<NewLabel>,
    ) -> Result<RecipeWithLabels> {
        let now = Utc::now();
        let recipe = Recipe {
            id: Uuid::new_v4().to_string(),
            name: require_name("name", name)?,
            creator_id: Some(actor.to_string()),
            created_at: now,
        };
        self.store.create_recipe(&recipe)?;

        let mut created = Vec::with_capacity(labels.len());
        for label in labels {
            created.push(self.insert_label(&recipe.id, label)?);
        }

        tracing::info!(recipe_id = %recipe.id, labels = created.len(), "created recipe");
        Ok(RecipeWithLabels {
            recipe,
            labels: created,
        })
    }

    pub fn get_recipe(&self, id: &str) -> Result<RecipeWithLabels> {
        let recipe = self.store.get_recipe(id)?.ok_or(Error::NotFound("recipe"))?;
        let labels = self.store.list_labels(id)?;
        Ok(RecipeWithLabels { recipe, labels })
    }

    pub fn list_recipes(&self, cursor: &str, limit: i32) -> Result<Vec<Recipe>> {
        self.store.list_recipes(cursor, limit)
    }

    /// The creator may add labels even once datasets use the recipe.
    pub fn add_label(&self, actor: &str, recipe_id: &str, label: NewLabel) -> Result<Label> {
        self.editable_recipe(actor, recipe_id)?;
        self.insert_label(recipe_id, label)
    }

    pub fn rename_label(&self, actor: &str, label_id: &str, name: &str) -> Result<Label> {
        let mut label = self.store.get_label(label_id)?.ok_or(Error::NotFound("label"))?;
        self.editable_recipe(actor, &label.recipe_id)?;
        self.ensure_recipe_unbound(&label.recipe_id)?;

        label.name = require_name("name", name)?;
        self.store.rename_label(&label.id, &label.name)?;
        Ok(label)
    }

    pub fn remove_label(&self, actor: &str, label_id: &str) -> Result<()> {
        let label = self.store.get_label(label_id)?.ok_or(Error::NotFound("label"))?;
        self.editable_recipe(actor, &label.recipe_id)?;
        self.ensure_recipe_unbound(&label.recipe_id)?;
        self.store.delete_label(&label.id)?;
        Ok(())
    }

    fn insert_label(&self, recipe_id: &str, label: NewLabel) -> Result<Label> {
        let label = Label {
            id: Uuid::new_v4().to_string(),
            recipe_id: recipe_id.to_string(),
            name: require_name("name", &label.name)?,
            tool: label.tool,
            created_at: Utc::now(),
        };
        self.store.create_label(&label)?;
        Ok(label)
    }

    fn editable_recipe(&self, actor: &str, recipe_id: &str) -> Result<Recipe> {
        let recipe = self
            .store
            .get_recipe(recipe_id)?
            .ok_or(Error::NotFound("recipe"))?;
        // The creator owns the label set; everyone else holds no role on it.
        if recipe.creator_id.as_deref() != Some(actor) {
            return Err(Error::PermissionDenied {
                required: Role::Owner,
                actual: Role::None,
            });
        }
        Ok(recipe)
    }

    fn ensure_recipe_unbound(&self, recipe_id: &str) -> Result<()> {
        if self.store.is_recipe_bound(recipe_id)? {
            return Err(Error::invalid_operation(
                "recipe is in use by a dataset; labels can only be added",
            ));
        }
        Ok(())
    }

    // Datasets

    pub fn create_dataset(&self, actor: &str, new: NewDataset) -> Result<Dataset> {
        self.store
            .get_recipe(&new.recipe_id)?
            .ok_or(Error::NotFound("recipe"))?;

        let now = Utc::now();
        let dataset = Dataset {
            id: Uuid::new_v4().to_string(),
            owner_id: actor.to_string(),
            name: require_name("name", &new.name)?,
            description: new.description,
            recipe_id: new.recipe_id,
            public: new.public,
            price: require_price(new.price)?,
            created_at: now,
            updated_at: now,
        };
        self.store.create_dataset(&dataset)?;

        tracing::info!(dataset_id = %dataset.id, owner_id = %actor, "created dataset");
        Ok(dataset)
    }

    /// Returns the dataset with the actor's effective role. Requires preview.
    pub fn get_dataset(&self, actor: Option<&str>, id: &str) -> Result<(Dataset, Role)> {
        let dataset = self.dataset(id)?;
        let role = self.authorize(&dataset, actor, Role::Preview)?;
        Ok((dataset, role))
    }

    /// Lists one page of datasets, keeping only those the actor can preview.
    /// Roles come from one batched grant lookup. The returned cursor is the
    /// last id scanned, so hidden datasets never stall paging.
    pub fn list_datasets(
        &self,
        actor: Option<&str>,
        cursor: &str,
        limit: i32,
    ) -> Result<(Vec<(Dataset, Role)>, Option<String>)> {
        let page = self.store.list_datasets(cursor, limit + 1)?;
        let has_more = page.len() > limit as usize;
        let page: Vec<Dataset> = page.into_iter().take(limit as usize).collect();
        let next_cursor = if has_more {
            page.last().map(|d| d.id.clone())
        } else {
            None
        };

        let roles = access::aggregate_roles(self.store.as_ref(), &page, actor)?;
        let visible = page
            .into_iter()
            .filter_map(|d| {
                let role = roles.get(&d.id).copied().unwrap_or(Role::None);
                role.satisfies(Role::Preview).then_some((d, role))
            })
            .collect();
        Ok((visible, next_cursor))
    }

    pub fn update_dataset(&self, actor: &str, id: &str, update: DatasetUpdate) -> Result<Dataset> {
        let mut dataset = self.dataset(id)?;
        self.authorize(&dataset, Some(actor), Role::Admin)?;

        if let Some(name) = update.name {
            dataset.name = require_name("name", &name)?;
        }
        if let Some(description) = update.description {
            dataset.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(public) = update.public {
            dataset.public = public;
        }
        if let Some(price) = update.price {
            dataset.price = require_price(price)?;
        }
        dataset.updated_at = Utc::now();

        self.store.update_dataset(&dataset)?;
        Ok(dataset)
    }

    /// Deletes the dataset with its assets, annotations, grants, and pull
    /// requests. Records go first; payloads are reclaimed afterwards.
    pub async fn delete_dataset(&self, actor: &str, id: &str) -> Result<()> {
        let dataset = self.dataset(id)?;
        self.authorize(&dataset, Some(actor), Role::Owner)?;

        let mut keys = self.store.list_dataset_asset_ids(&dataset.id)?;
        keys.extend(self.store.list_dataset_staged_asset_ids(&dataset.id)?);

        self.store.delete_dataset(&dataset.id)?;
        tracing::info!(dataset_id = %dataset.id, payloads = keys.len(), "deleted dataset");

        if let Err(e) = self.objects.delete_many(&keys).await {
            tracing::error!(dataset_id = %dataset.id, "failed to reclaim dataset payloads: {e}");
            return Err(e.into());
        }
        Ok(())
    }

    // Assets

    pub async fn upload_asset(&self, actor: &str, dataset_id: &str, new: NewAsset) -> Result<Asset> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Maintainer)?;

        let asset = Asset {
            id: Uuid::new_v4().to_string(),
            dataset_id: dataset.id,
            kind: AssetKind::from_mimetype(&new.mimetype),
            size: new.data.len() as i64,
            display_name: require_name("display_name", &new.display_name)?,
            mimetype: new.mimetype,
            stage: STAGE_UPLOADED.to_string(),
            created_at: Utc::now(),
        };

        self.objects.put(&asset.id, new.data, &asset.mimetype).await?;
        self.store.create_asset(&asset)?;
        Ok(asset)
    }

    pub fn get_asset(&self, actor: &str, asset_id: &str) -> Result<Asset> {
        self.asset_with_access(actor, asset_id, Role::Preview)
            .map(|(asset, _)| asset)
    }

    pub fn list_assets(
        &self,
        actor: &str,
        dataset_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Asset>> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, Some(actor), Role::Preview)?;
        self.store.list_dataset_assets(&dataset.id, cursor, limit)
    }

    pub async fn delete_asset(&self, actor: &str, asset_id: &str) -> Result<()> {
        let (asset, _) = self.asset_with_access(actor, asset_id, Role::Maintainer)?;

        self.store.delete_assets(std::slice::from_ref(&asset.id))?;
        self.objects.delete_many(&[asset.id]).await?;
        Ok(())
    }

    /// Time-limited download URL for the asset payload.
    pub fn asset_url(&self, actor: &str, asset_id: &str) -> Result<String> {
        let (asset, _) = self.asset_with_access(actor, asset_id, Role::Preview)?;
        Ok(self.objects.signed_url(&asset.id, self.config.signed_url_ttl)?)
    }

    // Direct annotation edits

    pub fn create_annotation(
        &self,
        actor: &str,
        asset_id: &str,
        value: AnnotationValue,
    ) -> Result<Annotation> {
        let (asset, dataset) = self.asset_with_access(actor, asset_id, Role::Maintainer)?;
        self.validate_annotation(&dataset, asset.kind, &value)?;

        let now = Utc::now();
        let annotation = Annotation {
            id: Uuid::new_v4().to_string(),
            asset_id: asset.id,
            value,
            old_annotation: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_annotation(&annotation)?;
        Ok(annotation)
    }

    pub fn list_annotations(&self, actor: &str, asset_id: &str) -> Result<Vec<Annotation>> {
        let (asset, _) = self.asset_with_access(actor, asset_id, Role::Preview)?;
        self.store.list_asset_annotations(&asset.id)
    }

    pub fn update_annotation(
        &self,
        actor: &str,
        annotation_id: &str,
        value: AnnotationValue,
    ) -> Result<Annotation> {
        let mut annotation = self
            .store
            .get_annotation(annotation_id)?
            .ok_or(Error::NotFound("annotation"))?;
        let (asset, dataset) = self.asset_with_access(actor, &annotation.asset_id, Role::Maintainer)?;
        self.validate_annotation(&dataset, asset.kind, &value)?;

        annotation.value = value;
        annotation.updated_at = Utc::now();
        self.store.update_annotation(&annotation)?;
        Ok(annotation)
    }

    pub fn delete_annotation(&self, actor: &str, annotation_id: &str) -> Result<()> {
        let annotation = self
            .store
            .get_annotation(annotation_id)?
            .ok_or(Error::NotFound("annotation"))?;
        self.asset_with_access(actor, &annotation.asset_id, Role::Maintainer)?;
        self.store.delete_annotation(&annotation.id)?;
        Ok(())
    }

    /// The label must come from the dataset's recipe, the data must fit the
    /// label's tool, and frames are only meaningful on video.
    pub(crate) fn validate_annotation(
        &self,
        dataset: &Dataset,
        kind: AssetKind,
        value: &AnnotationValue,
    ) -> Result<()> {
        let label = self
            .store
            .get_label(&value.label_id)?
            .filter(|l| l.recipe_id == dataset.recipe_id)
            .ok_or_else(|| Error::validation("label_id", "label is not part of the dataset recipe"))?;

        label.tool.validate(&value.data)?;

        if let Some(frame) = value.frame {
            if kind != AssetKind::Video {
                return Err(Error::validation("frame", "frames are only allowed on video assets"));
            }
            if frame < 0 {
                return Err(Error::validation("frame", "cannot be negative"));
            }
        }
        Ok(())
    }
}
