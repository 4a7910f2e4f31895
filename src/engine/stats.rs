use super::Engine;
use crate::error::Result;
use crate::objects::ObjectStore;
use crate::types::{DatasetStats, PullRequestStats, Role};

impl<O: ObjectStore> Engine<O> {
    /// Staged change counts of a pull request.
    pub fn get_stats(&self, actor: &str, pull_request_id: &str) -> Result<PullRequestStats> {
        let (pr, _) = self.readable_pull_request(actor, pull_request_id)?;
        self.store.pull_request_stats(&pr.id)
    }

    /// Asset and annotation totals. An asset counts as annotated once it has
    /// at least one annotation.
    pub fn dataset_stats(&self, actor: Option<&str>, dataset_id: &str) -> Result<DatasetStats> {
        let dataset = self.dataset(dataset_id)?;
        self.authorize(&dataset, actor, Role::Preview)?;
        self.store.dataset_stats(&dataset.id)
    }
}
