//! Dataset collaboration engine.
//!
//! Every operation takes the acting user id, authorizes it through
//! [`crate::access`], and then touches the document store and object store
//! in an order that never leaves a record pointing at a missing payload.

mod datasets;
mod grants;
mod merge;
mod proposals;
mod staging;
mod stats;

pub use datasets::{DatasetUpdate, NewAsset, NewDataset, NewLabel, RecipeWithLabels};
pub use grants::PurchaseSession;

use std::sync::Arc;
use std::time::Duration;

use crate::access;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::objects::ObjectStore;
use crate::store::Store;
use crate::types::{Asset, Dataset, PullRequest, Role};

pub const DEFAULT_MERGE_CONCURRENCY: usize = 8;
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on in-flight object copies while materializing staged assets.
    pub merge_concurrency: usize,
    pub signed_url_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

pub struct Engine<O: ObjectStore> {
    store: Arc<dyn Store>,
    objects: Arc<O>,
    events: Arc<EventBus>,
    config: EngineConfig,
}

impl<O: ObjectStore> Engine<O> {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<O>,
        events: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            objects,
            events,
            config,
        }
    }

    fn dataset(&self, id: &str) -> Result<Dataset> {
        self.store.get_dataset(id)?.ok_or(Error::NotFound("dataset"))
    }

    fn pull_request(&self, id: &str) -> Result<PullRequest> {
        self.store
            .get_pull_request(id)?
            .ok_or(Error::NotFound("pull request"))
    }

    fn authorize(&self, dataset: &Dataset, actor: Option<&str>, required: Role) -> Result<Role> {
        access::authorize(self.store.as_ref(), dataset, actor, required)
    }

    /// Loads an asset and its dataset, requiring `required` on the dataset.
    fn asset_with_access(&self, actor: &str, asset_id: &str, required: Role) -> Result<(Asset, Dataset)> {
        let asset = self.store.get_asset(asset_id)?.ok_or(Error::NotFound("asset"))?;
        let dataset = self.dataset(&asset.dataset_id)?;
        self.authorize(&dataset, Some(actor), required)?;
        Ok((asset, dataset))
    }
}
