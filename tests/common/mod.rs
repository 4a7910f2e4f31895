//! Shared fixtures for engine integration tests.
//!
//! Every fixture owns a temp directory holding a SQLite database and a
//! filesystem object store, so tests run in parallel without interference.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use datacollab::engine::{Engine, EngineConfig, NewAsset, NewDataset, NewLabel};
use datacollab::events::EventBus;
use datacollab::objects::{FsObjectStore, ObjectStore, ObjectStoreError};
use datacollab::store::{SqliteStore, Store};
use datacollab::types::{AnnotationValue, Asset, Dataset, Tool, User};

/// Filesystem object store that can be told to fail copies or deletes.
pub struct FlakyObjectStore {
    inner: FsObjectStore,
    pub fail_copies: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyObjectStore {
    fn unavailable(op: &str) -> ObjectStoreError {
        ObjectStoreError::Unavailable(format!("injected {op} failure"))
    }
}

impl ObjectStore for FlakyObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ObjectStoreError> {
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        self.inner.exists(key).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), ObjectStoreError> {
        if self.fail_copies.load(Ordering::SeqCst) {
            return Err(Self::unavailable("copy"));
        }
        self.inner.copy(src, dst).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), ObjectStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::unavailable("delete"));
        }
        self.inner.delete_many(keys).await
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        self.inner.signed_url(key, ttl)
    }
}

pub struct Labels {
    pub creator: String,
    pub recipe_id: String,
    pub bounding_box: String,
    pub line: String,
}

pub struct Fixture {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub objects: Arc<FlakyObjectStore>,
    pub events: Arc<EventBus>,
    pub engine: Engine<FlakyObjectStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(SqliteStore::new(temp_dir.path().join("test.db")).expect("open db"));
        store.initialize().expect("initialize db");

        let objects = Arc::new(FlakyObjectStore {
            inner: FsObjectStore::new(temp_dir.path(), "http://localhost:8080", "test-secret"),
            fail_copies: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        });
        let events = Arc::new(EventBus::default());

        let config = EngineConfig {
            merge_concurrency: 2,
            ..EngineConfig::default()
        };
        let engine = Engine::new(
            store.clone() as Arc<dyn Store>,
            Arc::clone(&objects),
            Arc::clone(&events),
            config,
        );

        Self {
            temp_dir,
            store,
            objects,
            events,
            engine,
        }
    }

    pub fn user(&self, name: &str) -> String {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_user(&user).expect("create user");
        user.id
    }

    pub fn recipe(&self) -> Labels {
        let creator = self.user(&format!("curator-{}", Uuid::new_v4()));
        let recipe = self
            .engine
            .create_recipe(
                &creator,
                "objects",
                vec![
                    NewLabel {
                        name: "car".to_string(),
                        tool: Tool::BoundingBox,
                    },
                    NewLabel {
                        name: "lane".to_string(),
                        tool: Tool::Line,
                    },
                ],
            )
            .expect("create recipe");

        Labels {
            creator,
            recipe_id: recipe.recipe.id,
            bounding_box: recipe.labels[0].id.clone(),
            line: recipe.labels[1].id.clone(),
        }
    }

    pub fn dataset(&self, owner: &str, recipe_id: &str, public: bool, price: i64) -> Dataset {
        self.engine
            .create_dataset(
                owner,
                NewDataset {
                    name: "street scenes".to_string(),
                    description: None,
                    recipe_id: recipe_id.to_string(),
                    public,
                    price,
                },
            )
            .expect("create dataset")
    }

    pub async fn upload(&self, actor: &str, dataset_id: &str, name: &str) -> Asset {
        self.engine
            .upload_asset(actor, dataset_id, image(name))
            .await
            .expect("upload asset")
    }

    pub fn annotate(&self, actor: &str, asset_id: &str, label_id: &str) -> String {
        self.engine
            .create_annotation(actor, asset_id, bbox(label_id))
            .expect("create annotation")
            .id
    }

    pub fn annotation_count(&self, dataset_id: &str) -> i64 {
        self.store
            .dataset_stats(dataset_id)
            .expect("dataset stats")
            .annotations
    }

    pub fn asset_count(&self, dataset_id: &str) -> i64 {
        self.store
            .dataset_stats(dataset_id)
            .expect("dataset stats")
            .assets
    }
}

pub fn image(name: &str) -> NewAsset {
    NewAsset {
        display_name: name.to_string(),
        mimetype: "image/png".to_string(),
        data: Bytes::from(format!("png:{name}")),
    }
}

pub fn bbox(label_id: &str) -> AnnotationValue {
    AnnotationValue {
        label_id: label_id.to_string(),
        data: vec![0.1, 0.1, 0.3, 0.3],
        frame: None,
    }
}
