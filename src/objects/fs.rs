use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{ObjectStore, ObjectStoreError, validate_key};

const CONTENT_TYPE_SUFFIX: &str = "type";

impl ObjectStoreError {
    fn from_io(key: &str, e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound(key.to_string())
        } else {
            Self::Io(e)
        }
    }
}

/// Object store on the local filesystem under `<data_dir>/objects`.
pub struct FsObjectStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_secret: String,
}

impl FsObjectStore {
    pub fn new(data_dir: &Path, public_base_url: impl Into<String>, signing_secret: impl Into<String>) -> Self {
        Self {
            base_path: data_dir.join("objects"),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let prefix = &key[..key.len().min(2)];
        self.base_path.join(prefix).join(key)
    }

    fn content_type_path(&self, key: &str) -> PathBuf {
        self.object_path(key).with_extension(CONTENT_TYPE_SUFFIX)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    /// Writes through a temp file and renames so readers never see a partial object.
    async fn write_atomic(&self, final_path: &Path, data: &[u8]) -> Result<(), ObjectStoreError> {
        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, final_path).await?;
        Ok(())
    }

    /// Returns the stored content type, if one was recorded.
    pub async fn content_type(&self, key: &str) -> Result<Option<String>, ObjectStoreError> {
        validate_key(key)?;
        match fs::read_to_string(self.content_type_path(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ObjectStoreError::Io(e)),
        }
    }

    fn signature_digest(&self, key: &str, expires: i64) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.finalize().to_vec()
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        hex::encode(self.signature_digest(key, expires))
    }

    /// Checks a signature produced by [`ObjectStore::signed_url`].
    #[must_use]
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        self.signature_digest(key, expires)
            .ct_eq(&provided)
            .into()
    }
}

impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        self.write_atomic(&self.object_path(key), &data).await?;
        self.write_atomic(&self.content_type_path(key), content_type.as_bytes())
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        validate_key(key)?;
        let data = fs::read(self.object_path(key))
            .await
            .map_err(|e| ObjectStoreError::from_io(key, e))?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        validate_key(key)?;
        Ok(fs::try_exists(self.object_path(key)).await?)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), ObjectStoreError> {
        validate_key(src)?;
        validate_key(dst)?;

        let data = fs::read(self.object_path(src))
            .await
            .map_err(|e| ObjectStoreError::from_io(src, e))?;
        self.write_atomic(&self.object_path(dst), &data).await?;

        if let Some(content_type) = self.content_type(src).await? {
            self.write_atomic(&self.content_type_path(dst), content_type.as_bytes())
                .await?;
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), ObjectStoreError> {
        for key in keys {
            validate_key(key)?;
        }

        for key in keys {
            for path in [self.object_path(key), self.content_type_path(key)] {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(ObjectStoreError::Io(e)),
                }
            }
        }
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signature(key, expires);
        Ok(format!(
            "{}/objects/{key}?expires={expires}&signature={signature}",
            self.public_base_url
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> FsObjectStore {
        FsObjectStore::new(temp_dir.path(), "http://localhost:8080", "secret")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);

        storage
            .put("asset-1", Bytes::from_static(b"123"), "image/png")
            .await
            .unwrap();

        assert!(storage.exists("asset-1").await.unwrap());
        assert_eq!(storage.get("asset-1").await.unwrap(), Bytes::from_static(b"123"));
        assert_eq!(
            storage.content_type("asset-1").await.unwrap().as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_copy_overwrites_destination() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);

        storage
            .put("src", Bytes::from_static(b"new"), "image/jpeg")
            .await
            .unwrap();
        storage
            .put("dst", Bytes::from_static(b"old"), "text/plain")
            .await
            .unwrap();

        storage.copy("src", "dst").await.unwrap();
        storage.copy("src", "dst").await.unwrap();

        assert_eq!(storage.get("dst").await.unwrap(), Bytes::from_static(b"new"));
        assert_eq!(
            storage.content_type("dst").await.unwrap().as_deref(),
            Some("image/jpeg")
        );
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);

        assert!(matches!(
            storage.copy("missing", "dst").await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_many_ignores_missing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);

        storage
            .put("a", Bytes::from_static(b"1"), "image/png")
            .await
            .unwrap();

        storage
            .delete_many(&["a".to_string(), "never-existed".to_string()])
            .await
            .unwrap();
        assert!(!storage.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);

        assert!(matches!(
            storage.get("../etc/passwd").await,
            Err(ObjectStoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_signed_url_verifies() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);

        let url = storage
            .signed_url("asset-1", Duration::from_secs(60))
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/objects/asset-1?expires="));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut signature = "";
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v,
                _ => {}
            }
        }

        assert!(storage.verify_signature("asset-1", expires, signature));
        assert!(!storage.verify_signature("asset-2", expires, signature));
        assert!(!storage.verify_signature("asset-1", expires - 3600, signature));
    }

    #[test]
    fn test_malformed_signatures_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);
        let expires = Utc::now().timestamp() + 60;
        let signature = storage.signature("asset-1", expires);

        assert!(storage.verify_signature("asset-1", expires, &signature));
        assert!(!storage.verify_signature("asset-1", expires, &signature[..signature.len() - 2]));
        assert!(!storage.verify_signature("asset-1", expires, &format!("{signature}00")));
        assert!(!storage.verify_signature("asset-1", expires, "not hex"));
        assert!(!storage.verify_signature("asset-1", expires, ""));
    }
}
