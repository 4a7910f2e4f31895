mod fs;

pub use fs::FsObjectStore;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Binary payload storage keyed by asset and staged asset identifiers.
///
/// Implementations are independent of the document store; callers order
/// writes so new payloads exist before records reference them, and records
/// are removed before payloads are reclaimed.
pub trait ObjectStore: Send + Sync + 'static {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<(), ObjectStoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, ObjectStoreError>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, ObjectStoreError>> + Send;

    /// Copies `src` to `dst`, overwriting `dst` if it already exists.
    fn copy(
        &self,
        src: &str,
        dst: &str,
    ) -> impl Future<Output = Result<(), ObjectStoreError>> + Send;

    /// Deletes every key, ignoring keys that are already gone.
    fn delete_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<(), ObjectStoreError>> + Send;

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
}

/// Validates that a key is safe to use as a single path component.
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidKey(key.to_string()))
    }
}
